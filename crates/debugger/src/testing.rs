//! Scripted adapter for exercising the controller without a real debugger.
//!
//! The [`ScriptedFactory`] and every adapter it starts share one [`Script`]:
//! tests queue up the states the adapter should report and afterwards
//! inspect the [`Call`]s the controller made.
use std::{
    collections::{BTreeMap, VecDeque},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use commands::Stream;
use crossbeam_channel::{Receiver, Sender};

use crate::{
    adapter::{AdapterError, AdapterFactory, DebuggerAdapter, StartRequest, StatusCallback},
    display::{LineColor, SourceDisplay},
    types::{AllState, Break, BreakId, DebugMode, Frame, State, Status, ThreadSelector, Variable},
};

/// An adapter operation, as recorded by the script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(DebugMode),
    Restart,
    State,
    Continue,
    StepOver,
    StepInto,
    StepOut,
    StepSingle,
    Stop,
    ListBreaks,
    UpdateBreaks(Vec<Break>),
    ClearBreak(BreakId),
    InitAllState,
    UpdateAllState(ThreadSelector, usize),
    FindFrames(PathBuf, usize),
    ListGlobals(String),
    GetVar(String),
    Detach { kill: bool },
}

/// What the next continue reports
#[derive(Debug, Clone)]
pub enum ContinueScript {
    /// Send these states, then end the stream
    States(Vec<State>),
    /// Send these states and keep the stream open until `stop`
    UntilStopped(Vec<State>),
}

#[derive(Default)]
pub struct Script {
    pub calls: Vec<Call>,
    pub continues: VecDeque<ContinueScript>,
    pub steps: VecDeque<Result<State, AdapterError>>,
    /// Reported by `init_all_state` and, unless overridden per frame, by
    /// `update_all_state`
    pub all_state: AllState,
    pub frame_states: BTreeMap<usize, AllState>,
    pub globals: Vec<Variable>,
    /// Breakpoints as the adapter sees them
    pub breaks: Vec<Break>,
    /// Requested line to resolved line, applied when breakpoints are set
    pub moved_lines: BTreeMap<usize, usize>,
    pub has_tasks: bool,
    pub fail_start: Option<AdapterError>,
    /// The next start blocks until this yields, standing in for a slow build
    pub build_gate: Option<Receiver<()>>,
    pub state: State,
    pub active: bool,
    next_id: BreakId,
    pending_continue: Option<Sender<State>>,
    on_status: Option<StatusCallback>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Starts [`ScriptedAdapter`]s sharing its script
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    script: Arc<Mutex<Script>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modify the script
    pub fn edit(&self, f: impl FnOnce(&mut Script)) {
        f(&mut lock(&self.script));
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.script).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.script).calls.clear();
    }

    pub fn push_continue(&self, script: ContinueScript) {
        lock(&self.script).continues.push_back(script);
    }

    pub fn push_step(&self, state: State) {
        lock(&self.script).steps.push_back(Ok(state));
    }

    /// Report a status change as an adapter would from its own thread
    pub fn fire_status(&self, status: Status, message: &str) {
        let callback = lock(&self.script).on_status.take();
        if let Some(callback) = callback {
            callback(status, message.to_string());
            lock(&self.script).on_status = Some(callback);
        }
    }
}

impl AdapterFactory for ScriptedFactory {
    fn start(
        &self,
        request: StartRequest,
        on_status: StatusCallback,
    ) -> Result<Box<dyn DebuggerAdapter>, AdapterError> {
        let gate = lock(&self.script).build_gate.take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        let mut script = lock(&self.script);
        script.calls.push(Call::Start(request.mode));
        if let Some(e) = script.fail_start.take() {
            return Err(e);
        }
        script.on_status = Some(on_status);
        script.active = true;
        script.state = State::default();
        request.output.append(
            Stream::Status,
            &format!("debugging {}", request.exe.display()),
            None,
        );
        Ok(Box::new(ScriptedAdapter {
            script: Arc::clone(&self.script),
        }))
    }
}

pub struct ScriptedAdapter {
    script: Arc<Mutex<Script>>,
}

impl ScriptedAdapter {
    fn record(&self, call: Call) -> MutexGuard<'_, Script> {
        let mut script = lock(&self.script);
        script.calls.push(call);
        script
    }

    fn step(&mut self, call: Call) -> Result<State, AdapterError> {
        let mut script = self.record(call);
        let state = match script.steps.pop_front() {
            Some(result) => result?,
            None => script.state.clone(),
        };
        script.state = state.clone();
        Ok(state)
    }
}

impl DebuggerAdapter for ScriptedAdapter {
    fn is_active(&self) -> bool {
        lock(&self.script).active
    }

    fn restart(&mut self) -> Result<(), AdapterError> {
        self.record(Call::Restart).state = State::default();
        Ok(())
    }

    fn state(&mut self) -> Result<State, AdapterError> {
        Ok(self.record(Call::State).state.clone())
    }

    fn continue_execution(&mut self) -> Result<Receiver<State>, AdapterError> {
        let mut script = self.record(Call::Continue);
        let (tx, rx) = crossbeam_channel::unbounded();
        let next = script.continues.pop_front().unwrap_or_else(|| {
            ContinueScript::States(vec![State {
                exited: true,
                ..Default::default()
            }])
        });
        let (states, keep_open) = match next {
            ContinueScript::States(states) => (states, false),
            ContinueScript::UntilStopped(states) => (states, true),
        };
        for state in states {
            script.state = state.clone();
            let _ = tx.send(state);
        }
        if keep_open {
            script.pending_continue = Some(tx);
        }
        Ok(rx)
    }

    fn step_over(&mut self) -> Result<State, AdapterError> {
        self.step(Call::StepOver)
    }

    fn step_into(&mut self) -> Result<State, AdapterError> {
        self.step(Call::StepInto)
    }

    fn step_out(&mut self) -> Result<State, AdapterError> {
        self.step(Call::StepOut)
    }

    fn step_single(&mut self) -> Result<State, AdapterError> {
        self.step(Call::StepSingle)
    }

    fn stop(&mut self) -> Result<State, AdapterError> {
        let mut script = self.record(Call::Stop);
        let state = State {
            running: false,
            next_up: false,
            cur_break: 0,
            ..script.state.clone()
        };
        script.state = state.clone();
        // the open continue ends with the stopped state
        if let Some(tx) = script.pending_continue.take() {
            let _ = tx.send(state.clone());
        }
        Ok(state)
    }

    fn list_breaks(&mut self) -> Result<Vec<Break>, AdapterError> {
        Ok(self.record(Call::ListBreaks).breaks.clone())
    }

    fn update_breaks(&mut self, breaks: &mut [Break]) -> Result<(), AdapterError> {
        let mut script = self.record(Call::UpdateBreaks(breaks.to_vec()));
        let mut known = Vec::with_capacity(breaks.len());
        for b in breaks.iter_mut() {
            if b.id == 0 {
                script.next_id += 1;
                b.id = script.next_id;
            }
            let mut resolved = b.clone();
            if let Some(line) = script.moved_lines.get(&b.line) {
                resolved.line = *line;
            }
            known.push(resolved);
        }
        script.breaks = known;
        Ok(())
    }

    fn clear_break(&mut self, id: BreakId) -> Result<(), AdapterError> {
        self.record(Call::ClearBreak(id)).breaks.retain(|b| b.id != id);
        Ok(())
    }

    fn init_all_state(&mut self, state: &State) -> Result<AllState, AdapterError> {
        let script = self.record(Call::InitAllState);
        if state.running {
            return Err(AdapterError::IsRunning);
        }
        Ok(script.all_state.clone())
    }

    fn update_all_state(
        &mut self,
        state: &State,
        selector: ThreadSelector,
        frame: usize,
    ) -> Result<AllState, AdapterError> {
        let script = self.record(Call::UpdateAllState(selector, frame));
        if state.running {
            return Err(AdapterError::IsRunning);
        }
        Ok(script
            .frame_states
            .get(&frame)
            .cloned()
            .unwrap_or_else(|| script.all_state.clone()))
    }

    fn find_frames(
        &mut self,
        _state: &State,
        path: &Path,
        line: usize,
    ) -> Result<Vec<Frame>, AdapterError> {
        let script = self.record(Call::FindFrames(path.to_path_buf(), line));
        Ok(script
            .all_state
            .stack
            .iter()
            .filter(|f| f.location.path == path && f.location.line == line)
            .cloned()
            .collect())
    }

    fn list_globals(&mut self, filter: &str) -> Result<Vec<Variable>, AdapterError> {
        let script = self.record(Call::ListGlobals(filter.to_string()));
        Ok(script
            .globals
            .iter()
            .filter(|v| v.name.contains(filter))
            .cloned()
            .collect())
    }

    fn get_var(
        &mut self,
        name: &str,
        _selector: ThreadSelector,
        _frame: usize,
    ) -> Result<Variable, AdapterError> {
        let script = self.record(Call::GetVar(name.to_string()));
        Variable::find(&script.all_state.vars, name)
            .or_else(|| Variable::find(&script.globals, name))
            .ok_or_else(|| AdapterError::Other(format!("no variable {name}")))
    }

    fn has_tasks(&self) -> bool {
        lock(&self.script).has_tasks
    }

    fn detach(&mut self, kill: bool) -> Result<(), AdapterError> {
        let mut script = self.record(Call::Detach { kill });
        script.active = false;
        script.pending_continue = None;
        Ok(())
    }
}

/// Display recording the color of every marked line
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    colors: Mutex<BTreeMap<(PathBuf, usize), LineColor>>,
}

impl RecordingDisplay {
    /// Color of the 0-based `line` of `path`
    pub fn color(&self, path: &Path, line: usize) -> Option<LineColor> {
        lock(&self.colors).get(&(path.to_path_buf(), line)).copied()
    }

    pub fn marked(&self) -> Vec<(PathBuf, usize, LineColor)> {
        lock(&self.colors)
            .iter()
            .map(|((path, line), color)| (path.clone(), *line, *color))
            .collect()
    }
}

impl SourceDisplay for RecordingDisplay {
    fn set_line_color(&self, path: &Path, line: usize, color: Option<LineColor>) {
        let mut colors = lock(&self.colors);
        match color {
            Some(color) => colors.insert((path.to_path_buf(), line), color),
            None => colors.remove(&(path.to_path_buf(), line)),
        };
    }
}
