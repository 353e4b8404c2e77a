//! The contract between the controller and a concrete debugger driver.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use commands::OutputSink;
use crossbeam_channel::Receiver;

use crate::types::{
    AllState, Break, BreakId, DebugMode, DebugParams, Frame, State, Status, ThreadSelector,
    Variable,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("building the debug target failed: {0}")]
    Build(String),

    #[error("could not start the debugger: {0}")]
    Spawn(String),

    /// The operation needs a stopped program
    #[error("program is running")]
    IsRunning,

    #[error("{0}")]
    Other(String),
}

/// Called by the adapter when its status changes outside a controller call,
/// e.g. the debuggee exits on its own
pub type StatusCallback = Box<dyn Fn(Status, String) + Send + Sync>;

/// Everything an adapter needs to start a session
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub mode: DebugMode,
    pub exe: PathBuf,
    pub root: PathBuf,
    pub params: DebugParams,
    /// Debuggee output goes here
    pub output: Arc<OutputSink>,
}

/// A live debugging session.
///
/// Line numbers are 1-based throughout.
pub trait DebuggerAdapter: Send {
    fn is_active(&self) -> bool;

    /// Restart the debuggee without rebuilding it
    fn restart(&mut self) -> Result<(), AdapterError>;

    fn state(&mut self) -> Result<State, AdapterError>;

    /// Resume execution; the receiver yields states until the program stops
    /// or exits and is then disconnected
    fn continue_execution(&mut self) -> Result<Receiver<State>, AdapterError>;

    fn step_over(&mut self) -> Result<State, AdapterError>;
    fn step_into(&mut self) -> Result<State, AdapterError>;
    fn step_out(&mut self) -> Result<State, AdapterError>;
    /// Step a single machine instruction
    fn step_single(&mut self) -> Result<State, AdapterError>;

    fn stop(&mut self) -> Result<State, AdapterError>;

    fn list_breaks(&mut self) -> Result<Vec<Break>, AdapterError>;

    /// Make the adapter's breakpoints match `breaks` exactly. New breakpoints
    /// (id 0) are given their adapter ids in place.
    fn update_breaks(&mut self, breaks: &mut [Break]) -> Result<(), AdapterError>;

    fn clear_break(&mut self, id: BreakId) -> Result<(), AdapterError>;

    /// Stack, threads and variables of a stopped program
    fn init_all_state(&mut self, state: &State) -> Result<AllState, AdapterError>;

    /// As [`DebuggerAdapter::init_all_state`] for a chosen thread and frame
    fn update_all_state(
        &mut self,
        state: &State,
        selector: ThreadSelector,
        frame: usize,
    ) -> Result<AllState, AdapterError>;

    /// Frames of every thread currently at `path:line`
    fn find_frames(
        &mut self,
        state: &State,
        path: &Path,
        line: usize,
    ) -> Result<Vec<Frame>, AdapterError>;

    fn list_globals(&mut self, filter: &str) -> Result<Vec<Variable>, AdapterError>;

    fn get_var(
        &mut self,
        name: &str,
        selector: ThreadSelector,
        frame: usize,
    ) -> Result<Variable, AdapterError>;

    /// Whether the debuggee has lightweight tasks alongside OS threads
    fn has_tasks(&self) -> bool;

    fn detach(&mut self, kill: bool) -> Result<(), AdapterError>;
}

/// Starts sessions
pub trait AdapterFactory: Send + Sync {
    fn start(
        &self,
        request: StartRequest,
        on_status: StatusCallback,
    ) -> Result<Box<dyn DebuggerAdapter>, AdapterError>;
}
