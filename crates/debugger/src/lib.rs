//! Debugger controller: drives a debug session through an abstract adapter
mod adapter;
mod controller;
mod display;
mod types;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapter::{AdapterError, AdapterFactory, DebuggerAdapter, StartRequest, StatusCallback};
pub use controller::{Controller, ControllerError, DebugEvent, DebugView, merge_breaks};
pub use display::{LineColor, NoDisplay, SourceDisplay};
pub use types::{
    AllState, Break, BreakId, DebugMode, DebugParams, Frame, Location, State, Status, Task,
    Thread, ThreadSelector, Variable,
};
