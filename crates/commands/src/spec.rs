use serde::{Deserialize, Serialize};

/// One process invocation of a command; both fields are templates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandStep {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandStep {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// How stdout lines are marked up in the output sink
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Escape the text only
    #[default]
    Plain,
    /// Turn `path:line:col` references into links
    Links,
}

/// A command that can be run from the menus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandSpec {
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub desc: String,

    /// Languages this command applies to; empty or `Any` matches all
    #[serde(default)]
    pub langs: Vec<String>,

    /// Version control systems this command applies to; empty matches any
    #[serde(default)]
    pub vcs: Vec<String>,

    pub steps: Vec<CommandStep>,

    /// Working directory template; empty means the project root
    #[serde(default)]
    pub dir: String,

    /// Each step waits for the previous one to succeed
    #[serde(default)]
    pub wait: bool,

    /// Surface the output tab when the command starts
    #[serde(default)]
    pub focus: bool,

    /// Ask the user before running
    #[serde(default)]
    pub confirm: bool,

    #[serde(default)]
    pub filter: FilterKind,
}

impl CommandSpec {
    pub fn new(category: impl Into<String>, name: impl Into<String>, steps: Vec<CommandStep>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            desc: String::new(),
            langs: Vec::new(),
            vcs: Vec::new(),
            steps,
            dir: String::new(),
            wait: false,
            focus: false,
            confirm: false,
            filter: FilterKind::Plain,
        }
    }

    /// The `Category: Name` label used to address this command
    pub fn label(&self) -> String {
        format!("{}: {}", self.category, self.name)
    }

    pub fn matches_lang(&self, lang: Option<&str>) -> bool {
        if self.langs.is_empty() || self.langs.iter().any(|l| l.eq_ignore_ascii_case("any")) {
            return true;
        }
        match lang {
            Some(lang) => self.langs.iter().any(|l| l.eq_ignore_ascii_case(lang)),
            None => false,
        }
    }

    pub fn matches_vcs(&self, vcs: Option<&str>) -> bool {
        if self.vcs.is_empty() {
            return true;
        }
        match vcs {
            Some(vcs) => self.vcs.iter().any(|v| v.eq_ignore_ascii_case(vcs)),
            None => false,
        }
    }

    /// Every template of this command: the directory, then each program and its arguments
    pub fn templates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.dir.as_str()).chain(self.steps.iter().flat_map(|step| {
            std::iter::once(step.program.as_str()).chain(step.args.iter().map(String::as_str))
        }))
    }

    /// Whether any template needs values from an active editor view
    pub fn requires_buffer(&self) -> bool {
        self.templates()
            .flat_map(argvars::template_vars)
            .filter_map(|name| argvars::lookup(&name))
            .any(|var| var.kind.needs_buffer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> CommandSpec {
        let mut spec = CommandSpec::new(
            "Go",
            "Build Dir",
            vec![CommandStep::new("go", &["build", "-v"])],
        );
        spec.langs = vec!["Go".to_string()];
        spec.dir = "{ProjectRoot}/{FileDirProjRel}".to_string();
        spec
    }

    #[test]
    fn label() {
        assert_eq!(spec().label(), "Go: Build Dir");
    }

    #[test]
    fn language_matching() {
        let spec = spec();
        assert!(spec.matches_lang(Some("go")));
        assert!(!spec.matches_lang(Some("Rust")));
        assert!(!spec.matches_lang(None));

        let mut any = spec.clone();
        any.langs = vec!["Any".to_string()];
        assert!(any.matches_lang(Some("Rust")));
        assert!(any.matches_lang(None));
    }

    #[test]
    fn vcs_matching() {
        let mut spec = spec();
        assert!(spec.matches_vcs(Some("git")));
        assert!(spec.matches_vcs(None));

        spec.vcs = vec!["git".to_string()];
        assert!(spec.matches_vcs(Some("Git")));
        assert!(!spec.matches_vcs(Some("svn")));
        assert!(!spec.matches_vcs(None));
    }

    #[test]
    fn buffer_requirement() {
        assert!(spec().requires_buffer());

        let mut project_only = spec();
        project_only.dir = "{ProjectRoot}".to_string();
        assert!(!project_only.requires_buffer());

        project_only.steps[0].args.push("\\{FilePath}".to_string());
        assert!(!project_only.requires_buffer());

        project_only.steps[0].args.push("{SelectionText}".to_string());
        assert!(project_only.requires_buffer());
    }

    #[test]
    fn deserialises_with_defaults() {
        let spec: CommandSpec = serde_json::from_str(
            r#"{"category": "Build", "name": "Make", "steps": [{"program": "make"}]}"#,
        )
        .unwrap();
        assert_eq!(spec.label(), "Build: Make");
        assert!(spec.steps[0].args.is_empty());
        assert!(!spec.wait);
        assert_eq!(spec.filter, FilterKind::Plain);
    }
}
