//! The project facade: one object per open project tying together its
//! settings, documents, commands, find and the debugger.
mod env;
mod events;
mod intent;
mod project;

pub use env::Environment;
pub use events::{EventQueue, UiEvent};
pub use intent::{ActiveView, DebugIntent, Intent, IntentContext, Outcome};
pub use project::{FindJob, Project, Services};
