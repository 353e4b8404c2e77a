//! Command engine: the command table, output sinks and the process runner
mod error;
mod filter;
mod registry;
mod runner;
mod running;
mod sink;
mod spec;

pub use error::CommandError;
pub use filter::{LinkFilter, OutputFilter, escape_markup};
pub use registry::{CommandRegistry, MenuGroup, split_label};
pub use runner::{DispatchOptions, NoPrompt, Prompter, RunEvent, RunStatus, Runner};
pub use running::{RunHandle, RunningTable};
pub use sink::{OutputLine, OutputSink, OutputSinks, SinkEvent, Stream};
pub use spec::{CommandSpec, CommandStep, FilterKind};
