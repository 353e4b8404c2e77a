use std::{
    fs::File,
    io::IsTerminal,
    path::{Path, PathBuf},
    sync::{Arc, atomic::AtomicBool},
    time::{Duration, SystemTime},
};

use commands::{
    CommandError, CommandRegistry, CommandSpec, CommandStep, NoPrompt, RunEvent, RunStatus,
};
use debugger::{
    Status,
    testing::{Call, ScriptedFactory},
};
use documents::{AutosaveChoice, AutosavePrompt, Buffer, Language, Region};
use find::{FindLoc, FindRequest};
use project::{
    ActiveView, DebugIntent, EventQueue, Intent, IntentContext, Outcome, Project, Services,
    UiEvent,
};
use state::{ProjectSettings, RecentPaths, StateManager};
use tracing_subscriber::EnvFilter;

// test suite "constructor"
#[ctor::ctor]
fn init() {
    let in_ci = std::env::var("CI")
        .map(|val| val == "true")
        .unwrap_or(false);

    if std::io::stderr().is_terminal() || in_ci {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init();
    }

    // error traces
    let _ = color_eyre::install();
}

fn sh(name: &str, script: &str) -> CommandSpec {
    let mut spec = CommandSpec::new("Test", name, vec![CommandStep::new("sh", &["-c", script])]);
    spec.wait = true;
    spec
}

fn write(root: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

struct Fixture {
    dir: tempfile::TempDir,
    factory: ScriptedFactory,
    project: Project,
}

fn fixture(configure: impl FnOnce(&mut Services)) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new();
    let mut services = Services::new(Arc::new(factory.clone()));
    services.registry = CommandRegistry::new(vec![
        sh("Cat", "cat {FilePath}"),
        sh("Hook", "echo saved > {FilePath}.hook"),
        sh("Env", "echo GO111MODULE=$GO111MODULE"),
    ]);
    configure(&mut services);

    let mut settings = ProjectSettings::new(dir.path());
    settings.go_mod = true;
    settings.run_exec = PathBuf::from("app");
    let project = Project::new(settings, services);
    Fixture {
        dir,
        factory,
        project,
    }
}

struct Answer(AutosaveChoice);

impl AutosavePrompt for Answer {
    fn autosave_found(&self, _path: &Path, _sidecar: &Path) -> AutosaveChoice {
        self.0
    }
}

fn ctx<'a>(active: Option<&'a ActiveView>, cancel: &'a Arc<AtomicBool>) -> IntentContext<'a> {
    IntentContext {
        active,
        prompter: &NoPrompt,
        cancel,
    }
}

#[test]
fn go_module_flag_reaches_commands() {
    let mut f = fixture(|_| {});
    assert_eq!(f.project.env().get("GO111MODULE"), Some("on"));

    let status = f
        .project
        .run_command("Test: Env", None, &NoPrompt)
        .unwrap()
        .wait();
    assert_eq!(status, RunStatus::Success);
    let sink = f.project.runner().sinks().get("Test: Env").unwrap();
    assert!(sink.text().contains("GO111MODULE=on"));

    f.project.update_settings(|s| s.go_mod = false);
    assert_eq!(
        f.project.runner().env().get("GO111MODULE").map(String::as_str),
        Some("off")
    );
}

#[test]
fn commands_bind_the_active_file() {
    let mut f = fixture(|_| {});
    let path = write(f.dir.path(), "notes.txt", "hello from notes\n");

    let err = f
        .project
        .run_command("Test: Cat", None, &NoPrompt)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CommandError>(),
        Some(CommandError::NoActiveBuffer(_))
    ));

    let buffer = f.project.open_file(&path, &Answer(AutosaveChoice::Discard)).unwrap();
    let active = ActiveView::new(buffer);
    let status = f
        .project
        .run_command("Test: Cat", Some(&active), &NoPrompt)
        .unwrap()
        .wait();
    assert_eq!(status, RunStatus::Success);
    assert_eq!(
        f.project.arg_values().get("FilePath"),
        Some(&*path.to_string_lossy())
    );
    let sink = f.project.runner().sinks().get("Test: Cat").unwrap();
    assert!(sink.text().contains("hello from notes"));
}

#[test]
fn saving_runs_language_hooks() {
    let mut f = fixture(|services| {
        services
            .lang_opts
            .set_post_save(Language::Markdown, vec!["Test: Hook".to_string()]);
    });
    let path = write(f.dir.path(), "README.md", "# title\n");
    let buffer = f.project.open_file(&path, &Answer(AutosaveChoice::Discard)).unwrap();
    let active = ActiveView::new(Arc::clone(&buffer));

    let cancel = Arc::new(AtomicBool::new(false));
    let outcome = f.project.perform(Intent::Save, ctx(Some(&active), &cancel)).unwrap();
    assert!(matches!(outcome, Outcome::Saved(1)));

    // wait for the hook through the running table
    let handle = f.project.runner().running().get("Test: Hook");
    if let Some(handle) = handle {
        handle.wait();
    }
    let hook = f.dir.path().join("README.md.hook");
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while !hook.exists() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(hook.exists());

    let err = f.project.perform(Intent::Save, ctx(None, &cancel)).unwrap_err();
    assert!(err.to_string().contains("active editor view"));
}

#[test]
fn leftover_autosave_can_be_opened_separately() {
    let f = fixture(|_| {});
    let path = write(f.dir.path(), "a.txt", "saved\n");
    write(f.dir.path(), "#a.txt#", "unsaved\n");

    f.project
        .open_file(&path, &Answer(AutosaveChoice::OpenSeparately))
        .unwrap();
    assert_eq!(f.project.docs().names(), vec!["a.txt", "#a.txt#"]);

    // opening again just brings the buffer forward
    let again = f
        .project
        .open_file(&path, &Answer(AutosaveChoice::Discard))
        .unwrap();
    assert_eq!(again.text(), "saved\n");
    assert_eq!(f.project.docs().len(), 2);
    assert!(f.dir.path().join("#a.txt#").exists());
}

#[test]
fn leftover_autosave_can_be_discarded() {
    let f = fixture(|_| {});
    let path = write(f.dir.path(), "a.txt", "saved\n");
    write(f.dir.path(), "#a.txt#", "unsaved\n");

    f.project
        .open_file(&path, &Answer(AutosaveChoice::Discard))
        .unwrap();
    assert_eq!(f.project.docs().names(), vec!["a.txt"]);
    assert!(!f.dir.path().join("#a.txt#").exists());
}

#[test]
fn find_and_replace_through_intents() {
    let mut f = fixture(|_| {});
    let open = write(f.dir.path(), "open.go", "old\n");
    write(f.dir.path(), "sub/closed.go", "old old\n");
    let buffer = f.project.open_file(&open, &Answer(AutosaveChoice::Discard)).unwrap();
    let cancel = Arc::new(AtomicBool::new(false));

    let request = FindRequest {
        replace: "new".to_string(),
        ..FindRequest::new("old", FindLoc::All)
    };
    let Outcome::Searching(job) = f
        .project
        .perform(Intent::Find(request.clone()), ctx(None, &cancel))
        .unwrap()
    else {
        panic!("expected a running find");
    };
    let results = job.join().unwrap().unwrap();
    let view = f.project.show_find(results).unwrap();
    assert_eq!(f.project.find_results().unwrap().total(), 3);
    assert_eq!(f.project.settings().find_params, request);
    assert!(view.text().contains("[2] "));

    let Outcome::Replaced(n) = f
        .project
        .perform(Intent::ReplaceAll, ctx(None, &cancel))
        .unwrap()
    else {
        panic!("expected a replace count");
    };
    assert_eq!(n, 3);
    assert_eq!(buffer.text(), "new\n");
    let closed = f
        .project
        .docs()
        .by_path(&f.dir.path().join("sub/closed.go"))
        .unwrap();
    assert_eq!(closed.text(), "new new\n");
    assert!(closed.is_dirty());
}

#[test]
fn find_runs_off_the_calling_thread() {
    let mut f = fixture(|_| {});
    write(f.dir.path(), "a.go", "needle
");
    let cancel = Arc::new(AtomicBool::new(false));

    let Outcome::Searching(job) = f
        .project
        .perform(
            Intent::Find(FindRequest::new("needle", FindLoc::All)),
            ctx(None, &cancel),
        )
        .unwrap()
    else {
        panic!("expected a running find");
    };
    // the project stays usable while the worker searches
    assert!(f.project.find_results().is_none());
    f.project.set_env_var("BUSY", "1");

    let results = job.join().unwrap().unwrap();
    assert_eq!(results.total(), 1);
    f.project.show_find(results).unwrap();
    assert_eq!(f.project.find_results().unwrap().total(), 1);

    cancel.store(true, std::sync::atomic::Ordering::SeqCst);
    let cancelled = f
        .project
        .start_find(FindRequest::new("needle", FindLoc::All), None, Arc::clone(&cancel))
        .join()
        .unwrap();
    assert!(cancelled.is_err());
}

#[test]
fn opening_a_result_highlights_pending_matches() {
    let mut f = fixture(|_| {});
    let path = write(f.dir.path(), "words.go", "old old\nold\n");
    let cancel = Arc::new(AtomicBool::new(false));
    let request = FindRequest {
        replace: "newer".to_string(),
        ..FindRequest::new("old", FindLoc::All)
    };
    f.project.find(request, None, &cancel).unwrap();

    // line 0 is the file header, matches follow
    assert!(f.project.replace_at(1).unwrap());
    let view = f.project.find_view().unwrap();
    let remaining = view.next_link(1).unwrap();

    let Outcome::Opened { buffer, region } = f
        .project
        .perform(Intent::OpenResult(remaining), ctx(None, &cancel))
        .unwrap()
    else {
        panic!("expected an opened result");
    };
    assert_eq!(buffer.path(), path);
    assert_eq!(buffer.text(), "newer old\nold\n");
    // the pending matches follow the earlier edit
    assert_eq!(region, Region::on_line(0, 6, 9));
    assert_eq!(
        buffer.highlights(),
        vec![Region::on_line(0, 6, 9), Region::on_line(1, 0, 3)]
    );
    assert!(f.project.docs().by_path(&path).is_some());

    assert!(f.project.open_result(0).is_err());
}

#[test]
fn debuggee_output_files_do_not_force_a_rebuild() {
    let mut f = fixture(|_| {});
    let main = write(f.dir.path(), "main.go", "package main\n");
    File::options()
        .write(true)
        .open(&main)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1))
        .unwrap();
    let before = f.project.latest_change();

    assert!(matches!(
        debug(&mut f.project, DebugIntent::Start),
        Outcome::Debugger(true)
    ));
    // written by the program under test while it ran
    write(f.dir.path(), "debuggee.log", "started\n");
    write(f.dir.path(), "target/debug/app", "binary");
    assert_eq!(f.project.latest_change(), before);

    debug(&mut f.project, DebugIntent::Start);
    let calls = f.factory.calls();
    assert_eq!(calls.iter().filter(|c| matches!(c, Call::Start(_))).count(), 1);
    assert!(calls.contains(&Call::Restart));
}

#[test]
fn saving_the_project_touches_recent_paths() {
    let recent_dir = tempfile::tempdir().unwrap();
    let recent_path = recent_dir.path().join("recent.json");
    let mut f = fixture(|services| {
        services.recent = Some(StateManager::new(&recent_path).unwrap());
    });

    f.project.update_settings(|s| {
        s.build_cmds = vec!["Test: Env".to_string()];
        s.version_control = "git".to_string();
    });
    f.project.save_project().unwrap();
    let filename = f.project.settings().project_filename.clone();
    assert!(filename.exists());

    let recent: StateManager<RecentPaths> = StateManager::new(&recent_path).unwrap();
    assert_eq!(recent.current().paths(), &[filename.clone()]);

    let reopened = Project::open(&filename, Services::new(Arc::new(ScriptedFactory::new()))).unwrap();
    assert_eq!(reopened.settings(), f.project.settings());
}

#[test]
fn build_runs_configured_commands() {
    let mut f = fixture(|_| {});
    let cancel = Arc::new(AtomicBool::new(false));
    assert!(f.project.perform(Intent::Build, ctx(None, &cancel)).is_err());

    f.project
        .update_settings(|s| s.build_cmds = vec!["Test: Env".to_string()]);
    let Outcome::Started(handles) = f
        .project
        .perform(Intent::Build, ctx(None, &cancel))
        .unwrap()
    else {
        panic!("expected started runs");
    };
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].wait(), RunStatus::Success);
}

#[test]
fn events_from_runs_and_sinks_are_merged() {
    let mut f = fixture(|_| {});
    f.project
        .run_command("Test: Env", None, &NoPrompt)
        .unwrap()
        .wait();

    // the finished event is posted right after the handle resolves
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let mut events = Vec::new();
    while std::time::Instant::now() < deadline {
        events.extend(f.project.drain_events());
        if events
            .iter()
            .any(|e| matches!(e, UiEvent::Run(RunEvent::Finished { .. })))
        {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(
        events
            .iter()
            .any(|e| matches!(e, UiEvent::Run(RunEvent::Started { name, .. }) if name == "Test: Env"))
    );
    assert!(events.iter().any(|e| matches!(e, UiEvent::Output(_))));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, UiEvent::Run(RunEvent::Finished { .. })))
    );
}

#[test]
fn waiting_keeps_output_ahead_of_run_events() {
    let mut f = fixture(|_| {});
    f.project
        .run_command("Test: Env", None, &NoPrompt)
        .unwrap()
        .wait();
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let mut events = Vec::new();
    while std::time::Instant::now() < deadline
        && !events
            .iter()
            .any(|e| matches!(e, UiEvent::Run(RunEvent::Finished { .. })))
    {
        events.extend(f.project.drain_events());
        std::thread::sleep(Duration::from_millis(20));
    }
    let line = events
        .iter()
        .find_map(|e| match e {
            UiEvent::Output(line) => Some(line.clone()),
            _ => None,
        })
        .unwrap();
    let finished = events
        .iter()
        .find_map(|e| match e {
            UiEvent::Run(run @ RunEvent::Finished { .. }) => Some(run.clone()),
            _ => None,
        })
        .unwrap();

    let (sink_tx, sink_rx) = crossbeam_channel::unbounded();
    let (run_tx, run_rx) = crossbeam_channel::unbounded();
    let (_debug_tx, debug_rx) = crossbeam_channel::unbounded();
    let queue = EventQueue::new(sink_rx, run_rx, debug_rx);

    // the ready source is picked at random, so try it many times
    for _ in 0..100 {
        sink_tx.send(line.clone()).unwrap();
        run_tx.send(finished.clone()).unwrap();
        assert_eq!(
            queue.wait(),
            vec![UiEvent::Output(line.clone()), UiEvent::Run(finished.clone())]
        );
    }
}

fn debug(project: &mut Project, intent: DebugIntent) -> Outcome {
    let cancel = Arc::new(AtomicBool::new(false));
    project
        .perform(Intent::Debug(intent), ctx(None, &cancel))
        .unwrap()
}

#[test]
fn debugging_through_intents() {
    let mut f = fixture(|_| {});
    let main = write(f.dir.path(), "main.go", "package main\n");
    // keep sources older than the session
    File::options()
        .write(true)
        .open(&main)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1))
        .unwrap();

    assert!(matches!(
        debug(&mut f.project, DebugIntent::Start),
        Outcome::Debugger(true)
    ));
    assert_eq!(f.project.debugger().status(), Status::Ready);
    assert!(
        f.project
            .runner()
            .sinks()
            .get("Debug: app")
            .is_some()
    );

    debug(&mut f.project, DebugIntent::add_break(&main, 1));
    let Outcome::Continuing(worker) = debug(&mut f.project, DebugIntent::Continue) else {
        panic!("expected a running continue");
    };
    worker.join().unwrap();
    assert_eq!(f.project.debugger().status(), Status::Finished);
    assert_eq!(f.project.debugger().breaks()[0].id, 1);

    // unchanged sources restart the session in place
    debug(&mut f.project, DebugIntent::Start);
    assert!(f.factory.calls().contains(&Call::Restart));

    // a newer source file forces a rebuild
    File::options()
        .write(true)
        .open(&main)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(3600))
        .unwrap();
    debug(&mut f.project, DebugIntent::Start);
    let starts = f
        .factory
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Start(_)))
        .count();
    assert_eq!(starts, 2);

    f.project.shutdown();
    assert!(!f.project.debugger().is_active());
}
