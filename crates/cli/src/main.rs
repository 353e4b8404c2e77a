use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::{Arc, atomic::AtomicBool},
};

use clap::{Parser, Subcommand};
use commands::{CommandRegistry, NoPrompt, RunEvent, RunStatus, SinkEvent};
use debugger::{AdapterError, AdapterFactory, DebuggerAdapter, StartRequest, StatusCallback};
use eyre::WrapErr;
use find::{FindLoc, FindRequest};
use project::{Project, Services, UiEvent};
use state::{LangOptions, ProjectSettings, RecentPaths, StateManager};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Headless front end for workbench projects")]
struct Args {
    /// Log as JSON lines
    #[clap(long)]
    json: bool,

    /// Command table to use instead of the built-in one
    #[clap(long)]
    commands: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Create a project file for a directory
    Init { root: PathBuf },
    /// List the commands that apply to a language and VCS
    Commands {
        #[clap(long)]
        lang: Option<String>,
        #[clap(long)]
        vcs: Option<String>,
    },
    /// Run a `Category: Name` command and print its output
    Run {
        project: PathBuf,
        label: String,
    },
    /// Search the project
    Find {
        project: PathBuf,
        pattern: String,
        #[clap(short, long)]
        ignore_case: bool,
        #[clap(short, long)]
        regex: bool,
        /// Only search files in open directories
        #[clap(long)]
        open_dirs: bool,
    },
    /// Recently opened projects
    Recent,
}

/// Debugging needs a UI; nothing here can start an adapter
struct NoAdapters;

impl AdapterFactory for NoAdapters {
    fn start(
        &self,
        _request: StartRequest,
        _on_status: StatusCallback,
    ) -> Result<Box<dyn DebuggerAdapter>, AdapterError> {
        Err(AdapterError::Spawn(
            "no debugger adapter configured".to_string(),
        ))
    }
}

fn init_logging(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn recent() -> eyre::Result<StateManager<RecentPaths>> {
    let dir = state::config_dir()?;
    StateManager::new(dir.join("recent.json")).context("loading recent projects")
}

fn services(commands: Option<&Path>) -> eyre::Result<Services> {
    let mut services = Services::new(Arc::new(NoAdapters));
    if let Some(path) = commands {
        services.registry = CommandRegistry::load_from(path)?;
    }
    let dir = state::config_dir()?;
    let langs: StateManager<LangOptions> =
        StateManager::new(dir.join("langs.json")).context("loading language options")?;
    services.lang_opts = langs.current().clone();
    services.recent = Some(recent()?);
    Ok(services)
}

/// Print output until the run named `label` finishes
fn follow(project: &Project, label: &str) -> RunStatus {
    loop {
        for event in project.events().wait() {
            match event {
                UiEvent::Output(SinkEvent::Line { sink, line }) if sink == label => {
                    println!("{}", line.text);
                }
                UiEvent::Run(RunEvent::Finished { name, status, .. }) if name == label => {
                    return status;
                }
                _ => {}
            }
        }
    }
}

fn main() -> eyre::Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.json);
    color_eyre::install().context("installing error handler")?;
    tracing::debug!(?args, "parsed command line arguments");

    match args.command {
        Cmd::Init { root } => {
            let root = std::path::absolute(&root).context("resolving project root")?;
            let settings = ProjectSettings::detect(&root);
            let mut project = Project::new(settings, services(args.commands.as_deref())?);
            project.save_project()?;
            println!("{}", project.settings().project_filename.display());
        }
        Cmd::Commands { lang, vcs } => {
            let registry = match args.commands {
                Some(path) => CommandRegistry::load_from(path)?,
                None => CommandRegistry::defaults(),
            };
            for group in registry.menu(lang.as_deref(), vcs.as_deref()) {
                println!("{}", group.category);
                for command in group.commands {
                    println!("  {:<24} {}", command.name, command.desc);
                }
            }
        }
        Cmd::Run { project, label } => {
            let mut project = Project::open(&project, services(args.commands.as_deref())?)?;
            project.set_no_prompt(true);
            let handle = project
                .run_command(&label, None, &NoPrompt)
                .with_context(|| format!("running {label}"))?;
            let status = follow(&project, handle.name());
            tracing::info!(%label, ?status, "command finished");
            if status != RunStatus::Success {
                eprintln!("{label}: {status:?}");
                return Ok(ExitCode::FAILURE);
            }
        }
        Cmd::Find {
            project,
            pattern,
            ignore_case,
            regex,
            open_dirs,
        } => {
            let mut project = Project::open(&project, services(args.commands.as_deref())?)?;
            let loc = if open_dirs { FindLoc::Open } else { FindLoc::All };
            let request = FindRequest {
                ignore_case,
                regex,
                ..FindRequest::new(pattern, loc)
            };
            let cancel = Arc::new(AtomicBool::new(false));
            let view = project.find(request, None, &cancel)?;
            print!("{}", view.text());
            project.save_project()?;
        }
        Cmd::Recent => {
            for path in recent()?.current().paths() {
                println!("{}", path.display());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
