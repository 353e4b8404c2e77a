use std::{
    collections::BTreeMap,
    ffi::OsString,
    io,
    os::unix::process::CommandExt,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::SystemTime,
};

use argvars::ArgValues;
use crossbeam_channel::{Receiver, Sender};
use uuid::Uuid;

use crate::{
    CommandError,
    filter::{LinkFilter, OutputFilter},
    running::{RunControl, RunHandle, RunningTable},
    sink::{OutputSink, OutputSinks, Stream},
    spec::{CommandSpec, FilterKind},
};

/// User interaction needed before a command can be dispatched
pub trait Prompter {
    /// Ask for confirmation of a command with the `confirm` flag
    fn confirm(&self, spec: &CommandSpec) -> bool;

    /// Ask for the value of a 1-based `PromptString` slot; `None` aborts
    fn prompt(&self, spec: &CommandSpec, slot: usize) -> Option<String>;
}

/// Accepts every confirmation and answers no prompts
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn confirm(&self, _spec: &CommandSpec) -> bool {
        true
    }

    fn prompt(&self, _spec: &CommandSpec, _slot: usize) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Keep the previous contents of an existing sink
    pub keep_output: bool,

    /// Session override: substitute nothing for unanswered prompts instead of asking
    pub no_prompt: bool,

    /// Whether an editor view with a file is active
    pub has_buffer: bool,

    /// Working directory for commands with an empty `dir`
    pub default_dir: PathBuf,
}

/// Final outcome of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Step `step` (0-based) exited unsuccessfully
    Failed { step: usize, code: Option<i32> },
    /// Step `step` could not be started
    SpawnFailed { step: usize, message: String },
    /// The run was killed
    Cancelled,
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Success)
    }
}

/// Lifecycle notifications, drained by the UI thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started { id: Uuid, name: String, focus: bool },
    Finished { id: Uuid, name: String, status: RunStatus },
}

#[derive(Debug, Clone)]
struct ResolvedStep {
    program: String,
    args: Vec<String>,
}

/// One dispatched execution of a command
#[derive(Debug)]
struct CommandRun {
    spec: CommandSpec,
    values: ArgValues,
    steps: Vec<ResolvedStep>,
    dir: PathBuf,
    sink: Arc<OutputSink>,
    handle: RunHandle,
    started: SystemTime,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Spawns commands and tracks them while they run
#[derive(Debug)]
pub struct Runner {
    running: Arc<RunningTable>,
    sinks: Arc<OutputSinks>,
    env: Mutex<BTreeMap<String, String>>,
    events_tx: Sender<RunEvent>,
    events_rx: Receiver<RunEvent>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(Arc::new(OutputSinks::new()))
    }
}

impl Runner {
    pub fn new(sinks: Arc<OutputSinks>) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            running: Arc::new(RunningTable::new()),
            sinks,
            env: Mutex::new(BTreeMap::new()),
            events_tx,
            events_rx,
        }
    }

    pub fn running(&self) -> &Arc<RunningTable> {
        &self.running
    }

    pub fn sinks(&self) -> &Arc<OutputSinks> {
        &self.sinks
    }

    pub fn events(&self) -> Receiver<RunEvent> {
        self.events_rx.clone()
    }

    /// Replace the variables exported to every spawned command
    pub fn set_env(&self, env: BTreeMap<String, String>) {
        *lock(&self.env) = env;
    }

    pub fn env(&self) -> BTreeMap<String, String> {
        lock(&self.env).clone()
    }

    /// Start `spec` with the argument values `values`.
    ///
    /// Returns once the run is registered and its worker thread started; the
    /// handle can be used to wait for or kill it. Errors returned here mean
    /// no process was spawned.
    #[tracing::instrument(skip_all, fields(command = %spec.label()))]
    pub fn dispatch(
        &self,
        spec: &CommandSpec,
        values: &mut ArgValues,
        prompter: &dyn Prompter,
        options: &DispatchOptions,
    ) -> Result<RunHandle, CommandError> {
        let label = spec.label();

        if spec.confirm && !prompter.confirm(spec) {
            tracing::debug!("command not confirmed");
            return Err(CommandError::Confirm(label));
        }

        if spec.requires_buffer() && !options.has_buffer {
            return Err(CommandError::NoActiveBuffer(label));
        }

        if !options.no_prompt {
            let missing = spec
                .templates()
                .flat_map(|t| values.missing_prompts(t))
                .collect::<std::collections::BTreeSet<_>>();
            for slot in missing {
                match prompter.prompt(spec, slot) {
                    Some(answer) => values.set_prompt(slot, answer)?,
                    None => break,
                }
            }
            values.check_prompts(spec.templates())?;
        }

        let steps: Vec<ResolvedStep> = spec
            .steps
            .iter()
            .map(|step| ResolvedStep {
                program: values.bind(&step.program),
                args: step.args.iter().map(|a| values.bind(a)).collect(),
            })
            .collect();
        let dir = match values.bind(&spec.dir) {
            dir if dir.is_empty() => options.default_dir.clone(),
            dir => PathBuf::from(dir),
        };

        // the old run writes its status line before the sink is cleared
        if let Some(status) = self.running.kill_by_name(&label) {
            tracing::debug!(?status, "killed previous run");
        }
        let sink = self.sinks.get_or_create(&label, !options.keep_output);
        let (handle, done) = RunHandle::new(label.as_str());
        self.running.insert(handle.clone());

        let run = CommandRun {
            spec: spec.clone(),
            values: values.clone(),
            steps,
            dir,
            sink,
            handle: handle.clone(),
            started: SystemTime::now(),
        };
        let _ = self.events_tx.send(RunEvent::Started {
            id: handle.id(),
            name: label,
            focus: spec.focus,
        });

        let running = Arc::clone(&self.running);
        let events = self.events_tx.clone();
        let env = self.env();
        thread::spawn(move || {
            let status = execute(&run, &env);
            finish(&run, status, &running, &events);
            drop(done);
        });

        Ok(handle)
    }

    /// Dispatch and block until the run finishes
    pub fn run_blocking(
        &self,
        spec: &CommandSpec,
        values: &mut ArgValues,
        prompter: &dyn Prompter,
        options: &DispatchOptions,
    ) -> Result<RunStatus, CommandError> {
        Ok(self.dispatch(spec, values, prompter, options)?.wait())
    }

    pub fn kill(&self, name: &str) -> Option<RunStatus> {
        self.running.kill_by_name(name)
    }

    pub fn kill_all(&self) {
        self.running.kill_all();
    }
}

fn filter_for(run: &CommandRun) -> Option<Box<dyn OutputFilter>> {
    match run.spec.filter {
        FilterKind::Plain => None,
        FilterKind::Links => Some(Box::new(LinkFilter::new(&run.dir))),
    }
}

fn resolve_program(program: &str, dir: &Path, env: &BTreeMap<String, String>) -> io::Result<PathBuf> {
    let paths: Option<OsString> = env
        .get("PATH")
        .map(OsString::from)
        .or_else(|| std::env::var_os("PATH"));
    which::which_in(program, paths, dir)
        .map_err(|e| io::Error::new(io::ErrorKind::NotFound, format!("{program}: {e}")))
}

fn spawn_step(
    step: &ResolvedStep,
    dir: &Path,
    env: &BTreeMap<String, String>,
) -> Result<Child, CommandError> {
    let spawn_error = |source| CommandError::Spawn {
        program: step.program.clone(),
        source,
    };
    let program = resolve_program(&step.program, dir, env).map_err(spawn_error)?;
    Command::new(program)
        .args(&step.args)
        .current_dir(dir)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(spawn_error)
}

/// A spawned step whose output is being copied into the sink
struct LiveStep {
    child: Child,
    pumps: Vec<thread::JoinHandle<()>>,
}

impl LiveStep {
    fn start(mut child: Child, run: &CommandRun, control: &Arc<RunControl>) -> Self {
        control.register(child.id());
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let sink = Arc::clone(&run.sink);
            let filter = filter_for(run);
            pumps.push(thread::spawn(move || {
                sink.pump(Stream::Stdout, stdout, filter.as_deref())
            }));
        }
        if let Some(stderr) = child.stderr.take() {
            let sink = Arc::clone(&run.sink);
            pumps.push(thread::spawn(move || sink.pump(Stream::Stderr, stderr, None)));
        }
        Self { child, pumps }
    }

    fn wait(mut self, control: &RunControl) -> io::Result<ExitStatus> {
        let status = self.child.wait();
        control.unregister(self.child.id());
        for pump in self.pumps {
            let _ = pump.join();
        }
        status
    }
}

fn step_outcome(
    step: usize,
    status: io::Result<ExitStatus>,
    control: &RunControl,
) -> Option<RunStatus> {
    match status {
        Ok(status) if status.success() => None,
        _ if control.is_cancelled() => Some(RunStatus::Cancelled),
        Ok(status) => Some(RunStatus::Failed {
            step,
            code: status.code(),
        }),
        Err(e) => Some(RunStatus::SpawnFailed {
            step,
            message: e.to_string(),
        }),
    }
}

#[tracing::instrument(skip_all, fields(command = %run.spec.label(), id = %run.handle.id()))]
fn execute(run: &CommandRun, env: &BTreeMap<String, String>) -> RunStatus {
    let control = run.handle.control();
    tracing::debug!(
        dir = %run.dir.display(),
        file = run.values.get("FilePath").unwrap_or_default(),
        wait = run.spec.wait,
        "executing command"
    );

    if run.spec.wait {
        for (i, step) in run.steps.iter().enumerate() {
            if control.is_cancelled() {
                return RunStatus::Cancelled;
            }
            let child = match spawn_step(step, &run.dir, env) {
                Ok(child) => child,
                Err(e) => {
                    return RunStatus::SpawnFailed {
                        step: i,
                        message: e.to_string(),
                    };
                }
            };
            let status = LiveStep::start(child, run, control).wait(control);
            if let Some(failure) = step_outcome(i, status, control) {
                return failure;
            }
        }
        return RunStatus::Success;
    }

    let mut live = Vec::with_capacity(run.steps.len());
    let mut outcome = None;
    for (i, step) in run.steps.iter().enumerate() {
        match spawn_step(step, &run.dir, env) {
            Ok(child) => live.push((i, LiveStep::start(child, run, control))),
            Err(e) => {
                outcome = Some(RunStatus::SpawnFailed {
                    step: i,
                    message: e.to_string(),
                });
                break;
            }
        }
    }
    if outcome.is_some() {
        for (_, step) in live.iter_mut() {
            let _ = step.child.kill();
        }
    }
    for (i, step) in live {
        let status = step.wait(control);
        if outcome.is_none() {
            outcome = step_outcome(i, status, control);
        }
    }
    outcome.unwrap_or(RunStatus::Success)
}

fn status_line(run: &CommandRun, status: &RunStatus) -> String {
    let label = run.spec.label();
    let elapsed = run.started.elapsed().unwrap_or_default();
    match status {
        RunStatus::Success => format!("{label} successful, took {elapsed:.2?}"),
        RunStatus::Failed { step, code } => {
            let program = &run.steps[*step].program;
            match code {
                Some(code) => format!("{label} failed: `{program}` exited with status {code}"),
                None => format!("{label} failed: `{program}` was terminated by a signal"),
            }
        }
        RunStatus::SpawnFailed { message, .. } => format!("{label} could not start: {message}"),
        RunStatus::Cancelled => format!("{label} killed after {elapsed:.2?}"),
    }
}

fn finish(run: &CommandRun, status: RunStatus, running: &RunningTable, events: &Sender<RunEvent>) {
    match &status {
        RunStatus::Success => tracing::debug!(command = %run.spec.label(), "command finished"),
        other => {
            tracing::warn!(command = %run.spec.label(), status = ?other, "command did not succeed")
        }
    }
    run.sink
        .append(Stream::Status, &status_line(run, &status), None);
    run.handle.control().set_status(status.clone());
    running.remove_run(run.handle.name(), run.handle.id());
    let _ = events.send(RunEvent::Finished {
        id: run.handle.id(),
        name: run.handle.name().to_string(),
        status,
    });
}
