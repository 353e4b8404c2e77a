use std::{
    path::{Path, PathBuf},
    sync::{Arc, atomic::AtomicBool},
    thread::JoinHandle,
    time::SystemTime,
};

use argvars::{ArgValues, ProjectVars};
use commands::{
    CommandRegistry, DispatchOptions, OutputSinks, Prompter, RunHandle, RunStatus, Runner,
};
use debugger::{AdapterFactory, Controller, NoDisplay, SourceDisplay};
use documents::{
    AutosavePrompt, Buffer, DocumentError, Language, MemoryBuffer, OpenDocs, Reconciled, Region,
    SaveAllPrompt, reconcile_on_open,
};
use eyre::{Context, OptionExt};
use find::{FileNode, FindConfig, FindRequest, FindResults, FindScope, Replacer, ResultsView};
use state::{LangOptions, ProjectSettings, RecentPaths, StateManager};
use walkdir::WalkDir;

use crate::{
    env::Environment,
    events::{EventQueue, UiEvent},
    intent::{ActiveView, DebugIntent, Intent, IntentContext, Outcome},
};

/// A find running on a worker thread; hand its results to
/// [`Project::show_find`]
pub type FindJob = JoinHandle<eyre::Result<FindResults>>;

/// Files that change what a build produces without being source files
const BUILD_FILES: &[&str] = &[
    "go.mod",
    "go.sum",
    "Cargo.toml",
    "Cargo.lock",
    "Makefile",
    "CMakeLists.txt",
    "package.json",
];

/// Directories holding build output rather than sources
const OUTPUT_DIRS: &[&str] = &[".git", "target", "node_modules"];

fn is_build_input(path: &Path) -> bool {
    Language::from_path(path).is_some_and(|l| l.is_source())
        || path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| BUILD_FILES.contains(&n))
}

/// Process-wide services a project is opened with
pub struct Services {
    pub registry: CommandRegistry,
    pub lang_opts: LangOptions,
    pub adapters: Arc<dyn AdapterFactory>,
    pub display: Arc<dyn SourceDisplay>,
    /// Touched whenever the project is opened or saved
    pub recent: Option<StateManager<RecentPaths>>,
}

impl Services {
    pub fn new(adapters: Arc<dyn AdapterFactory>) -> Self {
        Self {
            registry: CommandRegistry::defaults(),
            lang_opts: LangOptions::default(),
            adapters,
            display: Arc::new(NoDisplay),
            recent: None,
        }
    }
}

struct FindState {
    results: FindResults,
    view: ResultsView,
    replacer: Replacer,
}

/// The open project: settings, documents, running commands and the debugger
pub struct Project {
    settings: ProjectSettings,
    registry: CommandRegistry,
    lang_opts: LangOptions,
    recent: Option<StateManager<RecentPaths>>,
    runner: Runner,
    docs: OpenDocs,
    debugger: Controller,
    find_config: FindConfig,
    find: Option<FindState>,
    env: Environment,
    values: ArgValues,
    no_prompt: bool,
    last_save: SystemTime,
    events: EventQueue,
}

fn open_buffer(docs: &OpenDocs, path: &Path) -> Result<Arc<dyn Buffer>, DocumentError> {
    if let Some(buffer) = docs.by_path(path) {
        return Ok(buffer);
    }
    let buffer: Arc<dyn Buffer> = Arc::new(MemoryBuffer::open(path)?);
    docs.add(Arc::clone(&buffer));
    Ok(buffer)
}

impl Project {
    pub fn new(settings: ProjectSettings, services: Services) -> Self {
        let sinks = Arc::new(OutputSinks::new());
        let runner = Runner::new(Arc::clone(&sinks));
        let debugger = Controller::new(services.adapters, Arc::clone(&sinks), services.display);
        let events = EventQueue::new(sinks.events(), runner.events(), debugger.events());

        let mut project = Self {
            settings,
            registry: services.registry,
            lang_opts: services.lang_opts,
            recent: services.recent,
            runner,
            docs: OpenDocs::new(),
            debugger,
            find_config: FindConfig::default(),
            find: None,
            env: Environment::default(),
            values: ArgValues::default(),
            no_prompt: false,
            last_save: SystemTime::UNIX_EPOCH,
            events,
        };
        project.apply_settings();
        project
    }

    /// Load the project file at `path`
    #[tracing::instrument(skip(services))]
    pub fn open(path: &Path, services: Services) -> eyre::Result<Self> {
        let settings = ProjectSettings::load_from(path).wrap_err("opening project")?;
        let mut project = Self::new(settings, services);
        project.last_save = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        project.touch_recent();
        Ok(project)
    }

    /// Write the project file
    pub fn save_project(&mut self) -> eyre::Result<()> {
        self.settings.save().wrap_err("saving project")?;
        self.last_save = SystemTime::now();
        self.touch_recent();
        Ok(())
    }

    fn touch_recent(&mut self) {
        let path = self.settings.project_filename.clone();
        if let Some(recent) = self.recent.as_mut() {
            if let Err(e) = recent.update(|r| r.add(path)) {
                tracing::warn!(error = %e, "could not update recent projects");
            }
        }
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    /// Change the settings and apply them
    pub fn update_settings(&mut self, f: impl FnOnce(&mut ProjectSettings)) {
        f(&mut self.settings);
        self.apply_settings();
    }

    fn apply_settings(&mut self) {
        self.env.set_go_mod(self.settings.go_mod);
        self.runner.set_env(self.env.vars().clone());
    }

    pub fn set_env_var(&mut self, name: &str, value: &str) {
        self.env.set(name, value);
        self.runner.set_env(self.env.vars().clone());
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn lang_opts_mut(&mut self) -> &mut LangOptions {
        &mut self.lang_opts
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn docs(&self) -> &OpenDocs {
        &self.docs
    }

    pub fn debugger(&self) -> &Controller {
        &self.debugger
    }

    /// Values bound for the most recent command
    pub fn arg_values(&self) -> &ArgValues {
        &self.values
    }

    /// Substitute nothing for unanswered prompts instead of asking
    pub fn set_no_prompt(&mut self, no_prompt: bool) {
        self.no_prompt = no_prompt;
    }

    pub fn set_find_config(&mut self, config: FindConfig) {
        self.find_config = config;
    }

    pub fn project_vars(&self) -> ProjectVars {
        ProjectVars {
            root: self.settings.project_root.clone(),
            build_dir: self.settings.build_dir.clone(),
            build_target: self.settings.build_targ.clone(),
            run_exec: self.settings.run_exec.clone(),
        }
    }

    /// All pending events for the UI
    pub fn drain_events(&self) -> Vec<UiEvent> {
        self.events.drain()
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    /// Open `path`, or bring it to the front if already open.
    ///
    /// A leftover autosave sidecar is reconciled through `prompt`; when the
    /// user keeps it, it is opened as a buffer of its own.
    #[tracing::instrument(skip(self, prompt))]
    pub fn open_file(
        &self,
        path: &Path,
        prompt: &dyn AutosavePrompt,
    ) -> eyre::Result<Arc<dyn Buffer>> {
        if let Some(buffer) = self.docs.by_path(path) {
            self.docs.add(Arc::clone(&buffer));
            return Ok(buffer);
        }
        let buffer: Arc<dyn Buffer> = Arc::new(MemoryBuffer::open(path)?);
        match reconcile_on_open(buffer.as_ref(), prompt)? {
            Reconciled::OpenSeparately(sidecar) => {
                let recovered: Arc<dyn Buffer> = Arc::new(MemoryBuffer::open(&sidecar)?);
                self.docs.add(recovered);
            }
            Reconciled::Discarded | Reconciled::Nothing => {}
        }
        self.docs.add(Arc::clone(&buffer));
        Ok(buffer)
    }

    pub fn close_file(&self, buffer: &Arc<dyn Buffer>) {
        buffer.close();
        self.docs.remove(buffer);
    }

    /// Commands configured to run after saving `buffer`
    fn run_post_save(&self, buffer: &dyn Buffer, prompter: &dyn Prompter) -> Vec<RunHandle> {
        let Some(lang) = buffer.language() else {
            return Vec::new();
        };
        let path = buffer.path();
        let mut handles = Vec::new();
        for label in self.lang_opts.post_save(lang) {
            let spec = match self.registry.get(label) {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::warn!(%label, error = %e, "post-save command not found");
                    continue;
                }
            };
            let mut values = ArgValues::resolve(Some(&path), &self.project_vars(), None);
            match self
                .runner
                .dispatch(spec, &mut values, prompter, &self.dispatch_options(true))
            {
                Ok(handle) => handles.push(handle),
                Err(e) => tracing::warn!(%label, error = %e, "post-save command failed"),
            }
        }
        handles
    }

    fn dispatch_options(&self, has_buffer: bool) -> DispatchOptions {
        DispatchOptions {
            keep_output: false,
            no_prompt: self.no_prompt,
            has_buffer,
            default_dir: self.settings.project_root.clone(),
        }
    }

    /// Save one buffer and run its language's post-save commands
    pub fn save_file(
        &self,
        buffer: &Arc<dyn Buffer>,
        prompter: &dyn Prompter,
    ) -> eyre::Result<Vec<RunHandle>> {
        buffer.save()?;
        Ok(self.run_post_save(buffer.as_ref(), prompter))
    }

    /// Save every changed buffer, running post-save commands for each
    pub fn save_all(&self, prompter: &dyn Prompter) -> eyre::Result<usize> {
        let saved = self.docs.save_all(&mut |buffer| {
            self.run_post_save(buffer, prompter);
        })?;
        Ok(saved)
    }

    /// Ask what to do about unsaved changes before running `then`.
    ///
    /// Returns whether there were unsaved changes.
    pub fn save_all_check(
        &self,
        can_cancel: bool,
        prompt: &dyn SaveAllPrompt,
        prompter: &dyn Prompter,
        then: impl FnOnce(),
    ) -> eyre::Result<bool> {
        let changed = self.docs.save_all_check(
            can_cancel,
            prompt,
            &mut |buffer| {
                self.run_post_save(buffer, prompter);
            },
            then,
        )?;
        Ok(changed)
    }

    /// Run the command labelled `Category: Name` against the active view
    #[tracing::instrument(skip(self, active, prompter))]
    pub fn run_command(
        &mut self,
        label: &str,
        active: Option<&ActiveView>,
        prompter: &dyn Prompter,
    ) -> eyre::Result<RunHandle> {
        let spec = self.registry.get(label)?.clone();
        let file = active.map(ActiveView::path);
        self.values = ArgValues::resolve(
            file.as_deref(),
            &self.project_vars(),
            active.map(|a| &a.editor),
        );
        let options = self.dispatch_options(active.is_some());
        let handle = self
            .runner
            .dispatch(&spec, &mut self.values, prompter, &options)?;
        Ok(handle)
    }

    fn run_all(
        &mut self,
        labels: Vec<String>,
        what: &str,
        active: Option<&ActiveView>,
        prompter: &dyn Prompter,
    ) -> eyre::Result<Vec<RunHandle>> {
        if labels.is_empty() {
            eyre::bail!("no {what} commands configured");
        }
        labels
            .iter()
            .map(|label| self.run_command(label, active, prompter))
            .collect()
    }

    pub fn build(
        &mut self,
        active: Option<&ActiveView>,
        prompter: &dyn Prompter,
    ) -> eyre::Result<Vec<RunHandle>> {
        let labels = self.settings.build_cmds.clone();
        self.run_all(labels, "build", active, prompter)
    }

    pub fn run(
        &mut self,
        active: Option<&ActiveView>,
        prompter: &dyn Prompter,
    ) -> eyre::Result<Vec<RunHandle>> {
        let labels = self.settings.run_cmds.clone();
        self.run_all(labels, "run", active, prompter)
    }

    pub fn kill(&self, name: &str) -> Option<RunStatus> {
        self.runner.kill(name)
    }

    /// Start a find on a worker thread.
    ///
    /// The file tree and the open buffers are captured before the worker
    /// starts; `cancel` stops it between files.
    #[tracing::instrument(skip(self, cancel))]
    pub fn start_find(
        &self,
        request: FindRequest,
        active: Option<PathBuf>,
        cancel: Arc<AtomicBool>,
    ) -> FindJob {
        let settings = self.settings.clone();
        let buffers = self.docs.buffers();
        let config = self.find_config.clone();
        std::thread::spawn(move || -> eyre::Result<FindResults> {
            let root = &settings.project_root;
            let mut tree = FileNode::scan(root, &|dir| settings.dir_open(dir))
                .wrap_err("reading project tree")?;
            tree.attach_buffers(&buffers);
            let scope = FindScope {
                root,
                tree: Some(&tree),
                active: active.as_deref(),
                buffers: &buffers,
                config: &config,
            };
            let results = find::find(&request, &scope, &cancel)?;
            tracing::debug!(matches = results.total(), "find finished");
            Ok(results)
        })
    }

    /// Keep the results of a finished find for replacing, returning the
    /// results buffer
    pub fn show_find(&mut self, results: FindResults) -> eyre::Result<ResultsView> {
        let replacer = Replacer::new(&results)?;
        let view = results.render();
        self.settings.find_params = results.request.clone();
        self.find = Some(FindState {
            results,
            view: view.clone(),
            replacer,
        });
        Ok(view)
    }

    /// Find across the project and wait for the results
    pub fn find(
        &mut self,
        request: FindRequest,
        active: Option<&Path>,
        cancel: &Arc<AtomicBool>,
    ) -> eyre::Result<ResultsView> {
        let job = self.start_find(request, active.map(Path::to_path_buf), Arc::clone(cancel));
        let results = job
            .join()
            .map_err(|_| eyre::eyre!("find worker panicked"))??;
        self.show_find(results)
    }

    pub fn find_results(&self) -> Option<&FindResults> {
        self.find.as_ref().map(|f| &f.results)
    }

    /// Results buffer of the last find, minus the lines already replaced
    pub fn find_view(&self) -> Option<&ResultsView> {
        self.find.as_ref().map(|f| &f.view)
    }

    /// Open the file linked from results line `line`, highlighting its
    /// pending matches; returns where the linked match is now
    #[tracing::instrument(skip(self))]
    pub fn open_result(&self, line: usize) -> eyre::Result<(Arc<dyn Buffer>, Region)> {
        let state = self.find.as_ref().ok_or_eyre("no find results")?;
        let link = state
            .view
            .link_at(line)
            .ok_or_eyre("no match on this results line")?;
        let buffer = open_buffer(&self.docs, &link.path)?;
        let region = state
            .replacer
            .show(&link, buffer.as_ref())
            .ok_or_eyre("the linked match is no longer in the file")?;
        Ok((buffer, region))
    }

    /// Replace the match linked from results line `line`
    pub fn replace_at(&mut self, line: usize) -> eyre::Result<bool> {
        let path = self
            .find
            .as_ref()
            .ok_or_eyre("no find results")?
            .view
            .link_at(line)
            .ok_or_eyre("no match on this results line")?
            .path;
        let buffer = open_buffer(&self.docs, &path)?;
        let state = self.find.as_mut().ok_or_eyre("no find results")?;
        let replaced = state
            .replacer
            .replace_at(&mut state.view, line, buffer.as_ref())?;
        Ok(replaced)
    }

    /// Replace every remaining match of the last find
    pub fn replace_all(&mut self) -> eyre::Result<usize> {
        let state = self.find.as_mut().ok_or_eyre("no find results")?;
        let docs = &self.docs;
        let replaced = state
            .replacer
            .replace_all(&state.results, &mut |path| Ok(open_buffer(docs, path)?))?;
        Ok(replaced)
    }

    /// Newest modification of any project source or of the project file.
    ///
    /// Files the debuggee or a build writes (logs, binaries, anything under
    /// `target/`) are not counted.
    pub fn latest_change(&self) -> SystemTime {
        let newest_source = WalkDir::new(&self.settings.project_root)
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && e.file_name().to_str().is_some_and(|n| OUTPUT_DIRS.contains(&n)))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_build_input(e.path()))
            .filter_map(|e| e.metadata().ok()?.modified().ok())
            .max()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        newest_source.max(self.last_save)
    }

    /// Start or restart debugging the project executable
    pub fn debug_start(&self) -> eyre::Result<()> {
        let exe: PathBuf = self.settings.exe_path();
        self.debugger
            .start(
                &exe,
                &self.settings.project_root,
                &self.settings.debug_params(),
                self.latest_change(),
            )
            .wrap_err("starting debugger")
    }

    fn debug(&self, intent: DebugIntent) -> eyre::Result<Outcome> {
        let d = &self.debugger;
        let accepted = match intent {
            DebugIntent::Start => {
                self.debug_start()?;
                true
            }
            DebugIntent::Continue => {
                return Ok(match d.continue_exec() {
                    Some(worker) => Outcome::Continuing(worker),
                    None => Outcome::Debugger(false),
                });
            }
            DebugIntent::StepOver => d.step_over(),
            DebugIntent::StepInto => d.step_into(),
            DebugIntent::StepOut => d.step_out(),
            DebugIntent::StepInstruction => d.step_instruction(),
            DebugIntent::Stop => d.stop(),
            DebugIntent::Detach => {
                d.detach();
                true
            }
            DebugIntent::AddBreak { path, line } => {
                d.add_break(path, line);
                true
            }
            DebugIntent::DeleteBreak { path, line } => d.delete_break(&path, line),
            DebugIntent::ToggleBreak { path, line } => d.toggle_break(&path, line).is_some(),
            DebugIntent::SetFrame(depth) => d.set_frame(depth),
            DebugIntent::SetThread(id) => d.set_thread(id),
            DebugIntent::FindFrames { path, line } => !d.find_frames(&path, line).is_empty(),
            DebugIntent::ListGlobals(filter) => !d.list_globals(&filter).is_empty(),
            DebugIntent::ShowVar(name) => d.show_var(&name).is_some(),
        };
        Ok(Outcome::Debugger(accepted))
    }

    /// Carry out a UI request
    #[tracing::instrument(skip(self, ctx))]
    pub fn perform(&mut self, intent: Intent, ctx: IntentContext<'_>) -> eyre::Result<Outcome> {
        match intent {
            Intent::Save => {
                let active = ctx.active.ok_or_eyre("save needs an active editor view")?;
                self.save_file(&active.buffer, ctx.prompter)?;
                Ok(Outcome::Saved(1))
            }
            Intent::SaveAll => Ok(Outcome::Saved(self.save_all(ctx.prompter)?)),
            Intent::Build => Ok(Outcome::Started(self.build(ctx.active, ctx.prompter)?)),
            Intent::Run => Ok(Outcome::Started(self.run(ctx.active, ctx.prompter)?)),
            Intent::Command(label) => {
                let handle = self.run_command(&label, ctx.active, ctx.prompter)?;
                Ok(Outcome::Started(vec![handle]))
            }
            Intent::Kill(name) => Ok(Outcome::Killed(self.kill(&name))),
            Intent::Find(request) => {
                let job = self.start_find(request, ctx.active_path(), Arc::clone(ctx.cancel));
                Ok(Outcome::Searching(job))
            }
            Intent::OpenResult(line) => {
                let (buffer, region) = self.open_result(line)?;
                Ok(Outcome::Opened { buffer, region })
            }
            Intent::ReplaceAt(line) => {
                let replaced = self.replace_at(line)?;
                Ok(Outcome::Replaced(usize::from(replaced)))
            }
            Intent::ReplaceAll => Ok(Outcome::Replaced(self.replace_all()?)),
            Intent::Debug(intent) => self.debug(intent),
        }
    }

    /// Kill running commands and end the debug session
    pub fn shutdown(&self) {
        self.runner.kill_all();
        self.debugger.detach();
    }
}
