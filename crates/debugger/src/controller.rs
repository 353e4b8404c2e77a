//! State machine driving a [`DebuggerAdapter`] on behalf of the editor.
//!
//! The controller owns the session and the user's breakpoints. Adapter state
//! is reflected into a [`DebugView`] snapshot which readers copy under a read
//! lock; every write goes through the controller.
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::SystemTime,
};

use commands::{OutputSinks, Stream};
use crossbeam_channel::{Receiver, Sender};

use crate::{
    adapter::{AdapterError, AdapterFactory, DebuggerAdapter, StartRequest, StatusCallback},
    display::{LineColor, SourceDisplay},
    types::{
        Break, BreakId, DebugMode, DebugParams, Frame, Location, State, Status, Task, Thread,
        ThreadSelector, Variable,
    },
};


#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("starting the debug session failed")]
    Start(#[source] AdapterError),
}

/// Posted whenever the view changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    Status(Status),
    Refresh,
}

/// Everything the editor shows about the debug session
#[derive(Debug, Clone, Default)]
pub struct DebugView {
    pub mode: DebugMode,
    pub status: Status,
    pub breaks: Vec<Break>,
    pub cur_break: BreakId,
    pub state: State,
    /// Stack of the selected thread or task
    pub stack: Vec<Frame>,
    pub threads: Vec<Thread>,
    pub tasks: Vec<Task>,
    /// Locals of the selected frame
    pub vars: Vec<Variable>,
    pub globals: Vec<Variable>,
    pub find_frames: Vec<Frame>,
    pub selector: ThreadSelector,
    pub frame: usize,
    /// Line currently marked as the program counter
    pub shown: Option<Location>,
    /// Last variable asked for with [`Controller::show_var`]
    pub inspected: Option<Variable>,
    /// Last message from the adapter
    pub message: String,
}

struct Session {
    adapter: Box<dyn DebuggerAdapter>,
    started: SystemTime,
    mode: DebugMode,
    generation: u64,
}

struct Shared {
    factory: Arc<dyn AdapterFactory>,
    sinks: Arc<OutputSinks>,
    display: Arc<dyn SourceDisplay>,
    session: Mutex<Option<Session>>,
    view: RwLock<DebugView>,
    generation: AtomicU64,
    events_tx: Sender<DebugEvent>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn status_for(state: &State) -> Status {
    if state.running {
        Status::Running
    } else if state.exited {
        Status::Finished
    } else if state.cur_break > 0 {
        Status::Breakpoint
    } else {
        Status::Stopped
    }
}

fn break_color(b: &Break) -> LineColor {
    if b.enabled {
        LineColor::Active
    } else {
        LineColor::Inactive
    }
}

/// Merge the adapter's view of the breakpoints into the user's list.
///
/// Entries are matched by id, or by location for breakpoints the adapter has
/// not seen yet. Matched entries take the adapter's id and resolved location;
/// enabled flags, conditions and order stay the user's. Breakpoints only the
/// adapter knows about are dropped.
pub fn merge_breaks(local: &[Break], reported: &[Break]) -> Vec<Break> {
    local
        .iter()
        .map(|b| {
            let found = reported
                .iter()
                .find(|r| b.id != 0 && r.id == b.id)
                .or_else(|| reported.iter().find(|r| b.id == 0 && r.is_at(&b.path, b.line)));
            match found {
                Some(r) => Break {
                    id: r.id,
                    path: r.path.clone(),
                    line: r.line,
                    enabled: b.enabled,
                    cond: b.cond.clone(),
                },
                None => b.clone(),
            }
        })
        .collect()
}

impl Shared {
    fn send(&self, event: DebugEvent) {
        let _ = self.events_tx.send(event);
    }

    fn set_status(&self, status: Status) {
        write(&self.view).status = status;
        self.send(DebugEvent::Status(status));
    }

    /// Hand the user's breakpoints to the adapter and record assigned ids
    fn push_breaks(&self, adapter: &mut dyn DebuggerAdapter) -> Result<(), AdapterError> {
        let mut breaks = read(&self.view).breaks.clone();
        adapter.update_breaks(&mut breaks)?;

        let mut view = write(&self.view);
        for pushed in &breaks {
            if let Some(local) = view
                .breaks
                .iter_mut()
                .find(|b| b.id == 0 && b.is_at(&pushed.path, pushed.line))
            {
                local.id = pushed.id;
            }
        }
        Ok(())
    }

    /// Reflect a state reported by the adapter into the view
    fn apply_state(&self, adapter: &mut dyn DebuggerAdapter, state: State) {
        let status = status_for(&state);
        let stopped = !state.running && !state.exited;
        let has_tasks = adapter.has_tasks();

        let all = if stopped {
            match adapter.init_all_state(&state) {
                Ok(all) => Some(all),
                Err(AdapterError::IsRunning) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "could not read program state");
                    None
                }
            }
        } else {
            None
        };
        let reported = if stopped {
            adapter
                .list_breaks()
                .inspect_err(|e| tracing::warn!(error = %e, "could not list breakpoints"))
                .ok()
        } else {
            None
        };

        let shown = if stopped { state.location.clone() } else { None };
        let (previous, breaks, moved) = {
            let mut view = write(&self.view);
            view.status = status;
            view.cur_break = state.cur_break;
            view.frame = 0;
            view.selector =
                ThreadSelector::for_adapter(has_tasks, if has_tasks { state.task } else { state.thread });
            if let Some(all) = all {
                view.stack = all.stack;
                view.threads = all.threads;
                view.tasks = if has_tasks { all.tasks } else { Vec::new() };
                view.vars = all.vars;
            }
            let mut moved = Vec::new();
            if let Some(reported) = reported {
                let merged = merge_breaks(&view.breaks, &reported);
                // merging keeps order and length
                moved = view
                    .breaks
                    .iter()
                    .zip(&merged)
                    .filter(|(old, new)| !new.is_at(&old.path, old.line))
                    .map(|(old, new)| ((old.path.clone(), old.line), new.clone()))
                    .collect();
                view.breaks = merged;
            }
            view.state = state;
            let previous = std::mem::replace(&mut view.shown, shown.clone());
            (previous, view.breaks.clone(), moved)
        };

        for ((path, line), to) in &moved {
            let left = breaks.iter().find(|b| b.is_at(path, *line)).map(break_color);
            self.display
                .set_line_color(path, line.saturating_sub(1), left);
            self.display
                .set_line_color(&to.path, to.line.saturating_sub(1), Some(break_color(to)));
        }

        if let Some(prev) = previous {
            let color = breaks.iter().find(|b| b.is_at(&prev.path, prev.line)).map(break_color);
            self.display
                .set_line_color(&prev.path, prev.line.saturating_sub(1), color);
        }
        if let Some(loc) = &shown {
            let color = if status == Status::Breakpoint {
                LineColor::Current
            } else {
                LineColor::CurrentPC
            };
            self.display
                .set_line_color(&loc.path, loc.line.saturating_sub(1), Some(color));
        }

        tracing::debug!(%status, "applied program state");
        self.send(DebugEvent::Status(status));
        self.send(DebugEvent::Refresh);
    }

    /// Apply the terminal state of a continue, unless the session it belongs
    /// to has gone
    fn finish_continue(&self, generation: u64, last: Option<State>) {
        let mut session = lock(&self.session);
        let Some(session) = session.as_mut().filter(|s| s.generation == generation) else {
            tracing::debug!("session ended while running");
            return;
        };
        let state = match last {
            Some(state) => state,
            None => match session.adapter.state() {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(error = %e, "continue ended without a state");
                    return;
                }
            },
        };
        self.apply_state(session.adapter.as_mut(), state);
    }

    fn clear_shown(&self) {
        let previous = write(&self.view).shown.take();
        if let Some(prev) = previous {
            self.display
                .set_line_color(&prev.path, prev.line.saturating_sub(1), None);
        }
    }
}

fn detach_session(mut session: Session) {
    let kill = session.mode != DebugMode::Attach;
    tracing::debug!(kill, "detaching previous session");
    if let Err(e) = session.adapter.detach(kill) {
        tracing::warn!(error = %e, "detaching previous session failed");
    }
}

/// Drives one debug session at a time
pub struct Controller {
    shared: Arc<Shared>,
    events_rx: Receiver<DebugEvent>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        sinks: Arc<OutputSinks>,
        display: Arc<dyn SourceDisplay>,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            shared: Arc::new(Shared {
                factory,
                sinks,
                display,
                session: Mutex::new(None),
                view: RwLock::new(DebugView::default()),
                generation: AtomicU64::new(0),
                events_tx,
            }),
            events_rx,
        }
    }

    pub fn events(&self) -> Receiver<DebugEvent> {
        self.events_rx.clone()
    }

    /// Snapshot of the debug view
    pub fn view(&self) -> DebugView {
        read(&self.shared.view).clone()
    }

    pub fn status(&self) -> Status {
        read(&self.shared.view).status
    }

    pub fn breaks(&self) -> Vec<Break> {
        read(&self.shared.view).breaks.clone()
    }

    /// A session exists
    pub fn is_active(&self) -> bool {
        lock(&self.shared.session).is_some()
    }

    /// A session exists and the program is not running
    pub fn is_avail(&self) -> bool {
        self.is_active() && self.status() != Status::Running
    }

    /// The program can be stepped: available and no step in flight
    pub fn can_step(&self) -> bool {
        self.is_avail() && !read(&self.shared.view).state.next_up
    }

    fn status_callback(&self) -> StatusCallback {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Box::new(move |status, message| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            {
                let mut view = write(&shared.view);
                view.status = status;
                view.message = message;
            }
            shared.send(DebugEvent::Status(status));
            shared.send(DebugEvent::Refresh);
        })
    }

    /// Start debugging `exe`.
    ///
    /// An existing session is restarted in place unless the mode is `Attach`,
    /// the mode changed, or `latest_change` (the newest modification of the
    /// project's sources or project file) is after the session started; those
    /// cases build a fresh session.
    #[tracing::instrument(skip(self, params), fields(mode = ?params.mode))]
    pub fn start(
        &self,
        exe: &Path,
        root: &Path,
        params: &DebugParams,
        latest_change: SystemTime,
    ) -> Result<(), ControllerError> {
        // the session is taken out so adapter work never runs under the lock
        let mut current = lock(&self.shared.session).take();

        let rebuild = match current.as_ref() {
            None => true,
            Some(_) if params.mode == DebugMode::Attach => true,
            Some(s) => s.mode != params.mode || latest_change > s.started,
        };

        if !rebuild {
            if let Some(mut s) = current.take() {
                tracing::debug!("restarting existing session");
                if let Err(e) = s.adapter.restart() {
                    tracing::error!(error = %e, "restart failed");
                    self.shared.set_status(Status::Error);
                    return Err(ControllerError::Start(e));
                }
                self.install(s);
                self.shared.clear_shown();
                self.reset_view(params.mode);
                self.shared.set_status(Status::Ready);
                return Ok(());
            }
        }

        if let Some(old) = current.take() {
            detach_session(old);
        }
        self.shared.clear_shown();
        self.shared.set_status(Status::Building);

        let exe_name = exe
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| exe.display().to_string());
        let output = self
            .shared
            .sinks
            .get_or_create(&format!("Debug: {exe_name}"), true);
        let request = StartRequest {
            mode: params.mode,
            exe: exe.to_path_buf(),
            root: root.to_path_buf(),
            params: params.clone(),
            output: Arc::clone(&output),
        };

        match self.shared.factory.start(request, self.status_callback()) {
            Ok(adapter) => {
                let generation = self.shared.generation.fetch_add(1, Ordering::Relaxed) + 1;
                self.install(Session {
                    adapter,
                    started: SystemTime::now(),
                    mode: params.mode,
                    generation,
                });
                self.reset_view(params.mode);
                self.shared.set_status(Status::Ready);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "debug session failed to start");
                output.append(Stream::Status, &e.to_string(), None);
                self.shared.set_status(Status::Error);
                Err(ControllerError::Start(e))
            }
        }
    }

    /// Make `session` current; a session started concurrently is detached
    fn install(&self, session: Session) {
        let replaced = lock(&self.shared.session).replace(session);
        if let Some(old) = replaced {
            tracing::warn!("another session was started meanwhile");
            detach_session(old);
        }
    }

    fn reset_view(&self, mode: DebugMode) {
        let mut view = write(&self.shared.view);
        let breaks = std::mem::take(&mut view.breaks);
        *view = DebugView {
            mode,
            status: view.status,
            breaks,
            ..Default::default()
        };
    }

    /// End the session, killing the debuggee unless it was attached to
    #[tracing::instrument(skip(self))]
    pub fn detach(&self) {
        let running = self.status() == Status::Running;
        let Some(mut session) = lock(&self.shared.session).take() else {
            return;
        };
        if running {
            if let Err(e) = session.adapter.stop() {
                tracing::warn!(error = %e, "stopping before detach failed");
            }
        }
        let kill = session.mode != DebugMode::Attach;
        if let Err(e) = session.adapter.detach(kill) {
            tracing::warn!(error = %e, "detach failed");
        }
        self.shared.clear_shown();
        self.reset_view(session.mode);
        self.shared.set_status(Status::NotInit);
    }

    /// Resume the program on a worker thread.
    ///
    /// Returns `None` without touching the adapter unless the session is
    /// available. The worker applies the final state once the program stops
    /// or exits.
    #[tracing::instrument(skip(self))]
    pub fn continue_exec(&self) -> Option<JoinHandle<()>> {
        if !self.is_avail() {
            tracing::debug!("debugger not available");
            return None;
        }

        let (rx, generation) = {
            let mut session = lock(&self.shared.session);
            let session = session.as_mut()?;
            if let Err(e) = self.shared.push_breaks(session.adapter.as_mut()) {
                tracing::warn!(error = %e, "updating breakpoints failed");
                return None;
            }
            let rx = match session.adapter.continue_execution() {
                Ok(rx) => rx,
                Err(e) => {
                    tracing::warn!(error = %e, "continue failed");
                    return None;
                }
            };
            self.shared.set_status(Status::Running);
            (rx, session.generation)
        };

        let shared = Arc::clone(&self.shared);
        Some(thread::spawn(move || {
            let last = rx.iter().last();
            shared.finish_continue(generation, last);
        }))
    }

    fn step(
        &self,
        what: &str,
        f: impl FnOnce(&mut dyn DebuggerAdapter) -> Result<State, AdapterError>,
    ) -> bool {
        if !self.can_step() {
            tracing::debug!(what, "cannot step now");
            return false;
        }
        let mut session = lock(&self.shared.session);
        let Some(session) = session.as_mut() else {
            return false;
        };
        if let Err(e) = self.shared.push_breaks(session.adapter.as_mut()) {
            tracing::warn!(error = %e, "updating breakpoints failed");
            return false;
        }
        match f(session.adapter.as_mut()) {
            Ok(state) => {
                self.shared.apply_state(session.adapter.as_mut(), state);
                true
            }
            Err(AdapterError::IsRunning) => {
                tracing::debug!(what, "program is running");
                false
            }
            Err(e) => {
                tracing::warn!(what, error = %e, "step failed");
                false
            }
        }
    }

    pub fn step_over(&self) -> bool {
        self.step("over", |a| a.step_over())
    }

    pub fn step_into(&self) -> bool {
        self.step("into", |a| a.step_into())
    }

    pub fn step_out(&self) -> bool {
        self.step("out", |a| a.step_out())
    }

    pub fn step_instruction(&self) -> bool {
        self.step("instruction", |a| a.step_single())
    }

    /// Stop the program, ending any continue in flight
    #[tracing::instrument(skip(self))]
    pub fn stop(&self) -> bool {
        let mut session = lock(&self.shared.session);
        let Some(session) = session.as_mut() else {
            return false;
        };
        match session.adapter.stop() {
            Ok(state) => {
                self.shared.apply_state(session.adapter.as_mut(), state);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "stop failed");
                false
            }
        }
    }

    /// Add a breakpoint; the adapter learns of it on the next run
    pub fn add_break(&self, path: impl Into<PathBuf>, line: usize) {
        let b = Break::new(path, line);
        {
            let mut view = write(&self.shared.view);
            if view.breaks.iter().any(|e| e.is_at(&b.path, b.line)) {
                return;
            }
            view.breaks.push(b.clone());
        }
        self.shared
            .display
            .set_line_color(&b.path, line.saturating_sub(1), Some(LineColor::Active));
        self.shared.send(DebugEvent::Refresh);
    }

    /// Remove the breakpoint at `path:line`, clearing it in the adapter if it
    /// has been given an id there
    pub fn delete_break(&self, path: &Path, line: usize) -> bool {
        let Some(b) = self
            .breaks()
            .into_iter()
            .find(|b| b.is_at(path, line))
        else {
            return false;
        };
        if b.id != 0 && self.is_avail() {
            if let Some(session) = lock(&self.shared.session).as_mut() {
                if let Err(e) = session.adapter.clear_break(b.id) {
                    tracing::warn!(id = b.id, error = %e, "clearing breakpoint failed");
                }
            }
        }
        write(&self.shared.view)
            .breaks
            .retain(|e| !e.is_at(path, line));
        self.shared
            .display
            .set_line_color(path, line.saturating_sub(1), None);
        self.shared.send(DebugEvent::Refresh);
        true
    }

    /// Flip the enabled flag of the breakpoint at `path:line`, returning the
    /// new flag
    pub fn toggle_break(&self, path: &Path, line: usize) -> Option<bool> {
        let enabled = {
            let mut view = write(&self.shared.view);
            let b = view.breaks.iter_mut().find(|b| b.is_at(path, line))?;
            b.enabled = !b.enabled;
            b.enabled
        };
        let color = if enabled {
            LineColor::Active
        } else {
            LineColor::Inactive
        };
        self.shared
            .display
            .set_line_color(path, line.saturating_sub(1), Some(color));
        self.shared.send(DebugEvent::Refresh);
        Some(enabled)
    }

    fn with_stopped<T>(&self, f: impl FnOnce(&mut dyn DebuggerAdapter, &DebugView) -> T) -> Option<T> {
        if !self.is_avail() {
            return None;
        }
        let view = self.view();
        let mut session = lock(&self.shared.session);
        let session = session.as_mut()?;
        Some(f(session.adapter.as_mut(), &view))
    }

    fn select(&self, selector: ThreadSelector, frame: usize) -> bool {
        let result = self.with_stopped(|adapter, view| {
            adapter.update_all_state(&view.state, selector, frame)
        });
        match result {
            Some(Ok(all)) => {
                {
                    let mut view = write(&self.shared.view);
                    view.selector = selector;
                    view.frame = frame;
                    view.stack = all.stack;
                    view.vars = all.vars;
                }
                self.shared.send(DebugEvent::Refresh);
                true
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "selecting frame failed");
                false
            }
            None => false,
        }
    }

    /// Select the frame at `depth` of the current thread or task
    pub fn set_frame(&self, depth: usize) -> bool {
        let selector = read(&self.shared.view).selector;
        self.select(selector, depth)
    }

    /// Select a thread, or a task if the adapter has them; the frame resets
    /// to the top
    pub fn set_thread(&self, id: u64) -> bool {
        let has_tasks = match lock(&self.shared.session).as_ref() {
            Some(s) => s.adapter.has_tasks(),
            None => return false,
        };
        self.select(ThreadSelector::for_adapter(has_tasks, id), 0)
    }

    pub fn find_frames(&self, path: &Path, line: usize) -> Vec<Frame> {
        let frames = self
            .with_stopped(|adapter, view| adapter.find_frames(&view.state, path, line))
            .and_then(|r| r.inspect_err(|e| tracing::warn!(error = %e, "finding frames failed")).ok())
            .unwrap_or_default();
        write(&self.shared.view).find_frames = frames.clone();
        self.shared.send(DebugEvent::Refresh);
        frames
    }

    pub fn list_globals(&self, filter: &str) -> Vec<Variable> {
        let globals = self
            .with_stopped(|adapter, _| adapter.list_globals(filter))
            .and_then(|r| r.inspect_err(|e| tracing::warn!(error = %e, "listing globals failed")).ok())
            .unwrap_or_default();
        write(&self.shared.view).globals = globals.clone();
        self.shared.send(DebugEvent::Refresh);
        globals
    }

    fn lookup_var(&self, name: &str) -> Option<Variable> {
        if let Some(var) = Variable::find(&read(&self.shared.view).vars, name) {
            return Some(var);
        }
        self.with_stopped(|adapter, view| adapter.get_var(name, view.selector, view.frame))?
            .inspect_err(|e| tracing::debug!(name, error = %e, "variable not found"))
            .ok()
    }

    /// Fetch a variable and keep it for display
    pub fn show_var(&self, name: &str) -> Option<Variable> {
        let var = self.lookup_var(name)?;
        write(&self.shared.view).inspected = Some(var.clone());
        self.shared.send(DebugEvent::Refresh);
        Some(var)
    }

    /// Value of a variable, e.g. for a hover
    pub fn var_value(&self, name: &str) -> Option<String> {
        self.lookup_var(name).map(|v| v.value)
    }
}
