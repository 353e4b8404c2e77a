use std::{
    path::{Path, PathBuf},
    sync::{Arc, atomic::AtomicBool},
    thread::JoinHandle,
};

use argvars::EditorContext;
use commands::{Prompter, RunHandle, RunStatus};
use documents::{Buffer, Region};
use find::FindRequest;

use crate::project::FindJob;

/// The editor view the user is working in
#[derive(Debug, Clone)]
pub struct ActiveView {
    pub buffer: Arc<dyn Buffer>,
    pub editor: EditorContext,
}

impl ActiveView {
    pub fn new(buffer: Arc<dyn Buffer>) -> Self {
        Self {
            buffer,
            editor: EditorContext::default(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.buffer.path()
    }
}

/// What an intent needs from the UI
#[derive(Clone, Copy)]
pub struct IntentContext<'a> {
    pub active: Option<&'a ActiveView>,
    pub prompter: &'a dyn Prompter,
    /// Checked by long running finds
    pub cancel: &'a Arc<AtomicBool>,
}

impl IntentContext<'_> {
    pub fn active_path(&self) -> Option<PathBuf> {
        self.active.map(ActiveView::path)
    }
}

/// Debugger requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugIntent {
    Start,
    Continue,
    StepOver,
    StepInto,
    StepOut,
    StepInstruction,
    Stop,
    Detach,
    AddBreak { path: PathBuf, line: usize },
    DeleteBreak { path: PathBuf, line: usize },
    ToggleBreak { path: PathBuf, line: usize },
    SetFrame(usize),
    SetThread(u64),
    FindFrames { path: PathBuf, line: usize },
    ListGlobals(String),
    ShowVar(String),
}

impl DebugIntent {
    pub fn add_break(path: impl AsRef<Path>, line: usize) -> Self {
        DebugIntent::AddBreak {
            path: path.as_ref().to_path_buf(),
            line,
        }
    }
}

/// Everything the UI can ask of a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Save the active buffer
    Save,
    SaveAll,
    /// Run the project's build commands
    Build,
    /// Run the project's run commands
    Run,
    /// Run a command by `Category: Name` label
    Command(String),
    /// Kill a running command by name
    Kill(String),
    Find(FindRequest),
    /// Open the file behind a line of the find results
    OpenResult(usize),
    /// Replace the match linked from a line of the find results
    ReplaceAt(usize),
    ReplaceAll,
    Debug(DebugIntent),
}

/// Result of performing an intent
#[derive(Debug)]
pub enum Outcome {
    Saved(usize),
    Started(Vec<RunHandle>),
    Killed(Option<RunStatus>),
    /// A find is running; see [`crate::Project::show_find`]
    Searching(FindJob),
    /// A find result was opened at `region`
    Opened {
        buffer: Arc<dyn Buffer>,
        region: Region,
    },
    Replaced(usize),
    /// A continue is running on this thread
    Continuing(JoinHandle<()>),
    /// Whether the debugger accepted the request
    Debugger(bool),
}
