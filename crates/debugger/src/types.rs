use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

pub type BreakId = u64;

/// How the debuggee is started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebugMode {
    /// Build and run the project executable
    #[default]
    Exec,
    /// Build and run the project tests
    Test,
    /// Attach to an already running process
    Attach,
}

/// Parameters of a debug session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugParams {
    pub mode: DebugMode,
    /// Process to attach to in `Attach` mode
    pub pid: u32,
    /// Arguments for the debugger itself
    pub debug_args: Vec<String>,
    /// Arguments for the debuggee
    pub args: Vec<String>,
    /// Regex selecting the tests to run in `Test` mode
    pub test_run: String,
}

impl DebugParams {
    /// Split a combined argument list at the first bare `--`: debugger
    /// arguments come before it, program arguments after.
    pub fn split_args(combined: &[String]) -> (Vec<String>, Vec<String>) {
        match combined.iter().position(|a| a == "--") {
            Some(i) => (combined[..i].to_vec(), combined[i + 1..].to_vec()),
            None => (Vec::new(), combined.to_vec()),
        }
    }

    /// Combined argument list, the inverse of [`DebugParams::split_args`]
    pub fn combined_args(&self) -> Vec<String> {
        if self.debug_args.is_empty() {
            return self.args.clone();
        }
        let mut out = self.debug_args.clone();
        out.push("--".to_string());
        out.extend(self.args.iter().cloned());
        out
    }
}

/// Controller status, as shown to the user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Status {
    #[default]
    NotInit,
    Building,
    Ready,
    Running,
    Stopped,
    Breakpoint,
    Finished,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::NotInit => "not initialized",
            Status::Building => "building",
            Status::Ready => "ready",
            Status::Running => "running",
            Status::Stopped => "stopped",
            Status::Breakpoint => "at breakpoint",
            Status::Finished => "finished",
            Status::Error => "error",
        };
        f.write_str(s)
    }
}

/// A source location; `line` is 1-based
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Location {
    pub path: PathBuf,
    pub line: usize,
    pub func: String,
}

/// Execution state reported by the adapter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    pub running: bool,
    pub exited: bool,
    /// A step is in progress
    pub next_up: bool,
    pub exit_status: i32,
    /// Id of the breakpoint that was hit, 0 if none
    pub cur_break: BreakId,
    pub location: Option<Location>,
    pub thread: u64,
    pub task: u64,
}

impl State {
    pub fn stopped_at(location: Location) -> Self {
        Self {
            location: Some(location),
            ..Default::default()
        }
    }
}

/// A breakpoint; `line` is 1-based and `id` is 0 until the adapter assigns one
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Break {
    #[serde(default)]
    pub id: BreakId,
    pub path: PathBuf,
    pub line: usize,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub cond: String,
}

fn enabled_default() -> bool {
    true
}

impl Break {
    pub fn new(path: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            id: 0,
            path: path.into(),
            line,
            enabled: true,
            cond: String::new(),
        }
    }

    pub fn normalised_path(&self) -> Cow<'_, Path> {
        crate::utils::normalise_path(&self.path)
    }

    /// Whether this is the user's breakpoint at `path:line`
    pub fn is_at(&self, path: &Path, line: usize) -> bool {
        self.line == line && self.normalised_path() == crate::utils::normalise_path(path)
    }
}

impl FromStr for Break {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, line) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("breakpoint specification '{s}' has no colon"))?;
        let line: usize = line
            .parse()
            .map_err(|_| format!("invalid line number '{line}'"))?;
        if path.is_empty() || line == 0 {
            return Err(format!("invalid breakpoint specification '{s}'"));
        }
        Ok(Self::new(path, line))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub depth: usize,
    pub thread: u64,
    pub location: Location,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Thread {
    pub id: u64,
    pub name: String,
    pub location: Location,
}

/// A lightweight task (coroutine) scheduled on an OS thread
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Task {
    pub id: u64,
    pub thread: u64,
    pub location: Location,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub type_name: String,
    pub value: String,
    pub children: Vec<Variable>,
}

impl Variable {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value: value.into(),
            children: Vec::new(),
        }
    }

    /// Look up a nested variable by dotted path, e.g. `cfg.server.port`
    pub fn find(vars: &[Variable], path: &str) -> Option<Variable> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = vars.iter().find(|v| v.name == first)?;
        for part in parts {
            current = current.children.iter().find(|v| v.name == part)?;
        }
        Some(current.clone())
    }
}

/// Which thread or task frame operations apply to.
///
/// Adapters that expose tasks are addressed by task, the others by thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadSelector {
    Thread(u64),
    Task(u64),
}

impl Default for ThreadSelector {
    fn default() -> Self {
        ThreadSelector::Thread(0)
    }
}

impl ThreadSelector {
    pub fn for_adapter(has_tasks: bool, id: u64) -> Self {
        if has_tasks {
            ThreadSelector::Task(id)
        } else {
            ThreadSelector::Thread(id)
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            ThreadSelector::Thread(id) | ThreadSelector::Task(id) => *id,
        }
    }
}

/// Everything an adapter reports about a stopped program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllState {
    pub stack: Vec<Frame>,
    pub threads: Vec<Thread>,
    pub tasks: Vec<Task>,
    pub vars: Vec<Variable>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalisation() {
        let b = Break::new("~/test", 1);

        let path = b.normalised_path();

        let home_dir = dirs::home_dir().unwrap();
        assert_eq!(path, home_dir.join("test"));
    }

    macro_rules! break_from_str_tests {
        ($($name:ident: $value:expr,)*) => {
            mod break_from_str {
                use super::super::Break;
                use std::str::FromStr;

                $(
                    #[test]
                    fn $name () {
                        let (input, expected): (&str, Result<Break, String>) = $value;
                        assert_eq!(Break::from_str(input), expected);
                    }
                )*
            }
        }
    }

    break_from_str_tests! {
        empty_string: ("", Err("breakpoint specification '' has no colon".to_string())),
        invalid_structure: ("test", Err("breakpoint specification 'test' has no colon".to_string())),
        invalid_line_number: ("test.go:foo", Err("invalid line number 'foo'".to_string())),
        zero_line: ("test.go:0", Err("invalid breakpoint specification 'test.go:0'".to_string())),
        success: ("../test.go:16", Ok(Break::new("../test.go", 16))),
    }

    #[test]
    fn split_debug_args() {
        let combined: Vec<String> = ["--check-go-version=false", "--", "-v", "--", "x"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (debug, program) = DebugParams::split_args(&combined);
        assert_eq!(debug, vec!["--check-go-version=false"]);
        assert_eq!(program, vec!["-v", "--", "x"]);

        let params = DebugParams {
            debug_args: debug,
            args: program,
            ..Default::default()
        };
        assert_eq!(params.combined_args(), combined);

        let (debug, program) = DebugParams::split_args(&["a".to_string()]);
        assert!(debug.is_empty());
        assert_eq!(program, vec!["a"]);
    }

    #[test]
    fn nested_variables() {
        let mut cfg = Variable::new("cfg", "Config", "{...}");
        let mut server = Variable::new("server", "Server", "{...}");
        server.children.push(Variable::new("port", "int", "8080"));
        cfg.children.push(server);
        let vars = vec![Variable::new("x", "int", "1"), cfg];

        assert_eq!(Variable::find(&vars, "x").unwrap().value, "1");
        assert_eq!(Variable::find(&vars, "cfg.server.port").unwrap().value, "8080");
        assert!(Variable::find(&vars, "cfg.client").is_none());
    }

    #[test]
    fn selector_follows_capability() {
        assert_eq!(ThreadSelector::for_adapter(true, 3), ThreadSelector::Task(3));
        assert_eq!(ThreadSelector::for_adapter(false, 3), ThreadSelector::Thread(3));
    }
}
