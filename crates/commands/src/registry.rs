use std::{
    collections::BTreeMap,
    io::{Read, Write},
    path::Path,
};

use eyre::Context;

use crate::{
    CommandError,
    spec::{CommandSpec, CommandStep, FilterKind},
};

/// Split a `Category: Name` label into its parts
pub fn split_label(label: &str) -> Result<(&str, &str), CommandError> {
    label
        .split_once(':')
        .map(|(category, name)| (category.trim(), name.trim()))
        .filter(|(category, name)| !category.is_empty() && !name.is_empty())
        .ok_or_else(|| CommandError::InvalidLabel(label.to_string()))
}

/// Commands of one category, as shown in a menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuGroup<'a> {
    pub category: &'a str,
    pub commands: Vec<&'a CommandSpec>,
}

/// The catalogue of available commands
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: Vec<CommandSpec>,
}

impl CommandRegistry {
    pub fn new(commands: Vec<CommandSpec>) -> Self {
        let mut registry = Self::default();
        for command in commands {
            registry.insert(command);
        }
        registry
    }

    /// Look up a command by its `Category: Name` label
    pub fn get(&self, label: &str) -> Result<&CommandSpec, CommandError> {
        let (category, name) = split_label(label)?;
        self.commands
            .iter()
            .find(|c| c.category == category && c.name == name)
            .ok_or_else(|| CommandError::UnknownCommand(label.to_string()))
    }

    /// Add a command, replacing any existing one with the same label
    pub fn insert(&mut self, command: CommandSpec) {
        match self
            .commands
            .iter_mut()
            .find(|c| c.category == command.category && c.name == command.name)
        {
            Some(existing) => *existing = command,
            None => self.commands.push(command),
        }
    }

    pub fn remove(&mut self, label: &str) -> Option<CommandSpec> {
        let (category, name) = split_label(label).ok()?;
        let pos = self
            .commands
            .iter()
            .position(|c| c.category == category && c.name == name)?;
        Some(self.commands.remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Commands applicable to `lang` and `vcs`, grouped by category.
    ///
    /// Categories and names are sorted alphabetically, except that `Build`
    /// comes first and the category named after the active VCS second.
    pub fn menu(&self, lang: Option<&str>, vcs: Option<&str>) -> Vec<MenuGroup<'_>> {
        let mut groups: BTreeMap<&str, Vec<&CommandSpec>> = BTreeMap::new();
        for command in self
            .commands
            .iter()
            .filter(|c| c.matches_lang(lang) && c.matches_vcs(vcs))
        {
            groups.entry(command.category.as_str()).or_default().push(command);
        }

        let rank = |category: &str| {
            if category == "Build" {
                0
            } else if vcs.is_some_and(|vcs| category.eq_ignore_ascii_case(vcs)) {
                1
            } else {
                2
            }
        };

        let mut menu: Vec<MenuGroup> = groups
            .into_iter()
            .map(|(category, mut commands)| {
                commands.sort_by(|a, b| a.name.cmp(&b.name));
                MenuGroup { category, commands }
            })
            .collect();
        // stable: alphabetical order is kept within each rank
        menu.sort_by_key(|group| rank(group.category));
        menu
    }

    pub fn load(reader: impl Read) -> eyre::Result<Self> {
        let commands: Vec<CommandSpec> =
            serde_json::from_reader(reader).context("reading command table")?;
        Ok(Self::new(commands))
    }

    pub fn load_from(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let f = std::fs::File::open(path)
            .with_context(|| format!("opening command table {}", path.display()))?;
        Self::load(f).context("loading command table")
    }

    pub fn save(&self, writer: impl Write) -> eyre::Result<()> {
        serde_json::to_writer_pretty(writer, &self.commands).context("writing command table")?;
        Ok(())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> eyre::Result<()> {
        let f = std::fs::File::create(path).context("creating command table file")?;
        self.save(&f).context("saving command table")
    }

    /// The commands available when no table has been configured
    pub fn defaults() -> Self {
        fn cmd(
            category: &str,
            name: &str,
            desc: &str,
            langs: &[&str],
            steps: Vec<CommandStep>,
            dir: &str,
        ) -> CommandSpec {
            let mut spec = CommandSpec::new(category, name, steps);
            spec.desc = desc.to_string();
            spec.langs = langs.iter().map(|l| l.to_string()).collect();
            spec.dir = dir.to_string();
            spec
        }

        let mut commands = vec![
            cmd(
                "Build",
                "Go Build Proj",
                "go build the project build directory",
                &["Go"],
                vec![CommandStep::new("go", &["build", "-v"])],
                "{BuildDir}",
            ),
            cmd(
                "Build",
                "Cargo Build",
                "cargo build the project",
                &["Rust"],
                vec![CommandStep::new("cargo", &["build"])],
                "{ProjectRoot}",
            ),
            cmd(
                "Build",
                "Make",
                "run make in the build directory",
                &["Any"],
                vec![CommandStep::new("make", &[])],
                "{BuildDir}",
            ),
            cmd(
                "Run",
                "Run Exec",
                "run the project executable",
                &["Any"],
                vec![CommandStep::new("{RunExec}", &[])],
                "{BuildDir}",
            ),
            cmd(
                "Go",
                "Run File",
                "go run the current file",
                &["Go"],
                vec![CommandStep::new("go", &["run", "{Filename}"])],
                "{ProjectRoot}/{FileDirProjRel}",
            ),
            cmd(
                "Go",
                "Imports File",
                "run goimports on the current file",
                &["Go"],
                vec![CommandStep::new("goimports", &["-w", "{FilePath}"])],
                "{ProjectRoot}",
            ),
            cmd(
                "Rust",
                "Fmt File",
                "run rustfmt on the current file",
                &["Rust"],
                vec![CommandStep::new("rustfmt", &["{FilePath}"])],
                "{ProjectRoot}",
            ),
            cmd(
                "Rust",
                "Cargo Test",
                "cargo test the project",
                &["Rust"],
                vec![CommandStep::new("cargo", &["test"])],
                "{ProjectRoot}",
            ),
            cmd(
                "File",
                "Grep",
                "recursive grep for a prompted string",
                &["Any"],
                vec![CommandStep::new("grep", &["-rn", "{PromptString1}", "."])],
                "{ProjectRoot}",
            ),
        ];

        for command in commands.iter_mut() {
            if command.category == "Build" || command.category == "Rust" {
                command.filter = FilterKind::Links;
            }
            if command.category == "Build" || command.category == "Run" {
                command.focus = true;
            }
        }

        let git = |name: &str, desc: &str, args: &[&str]| {
            let mut spec = cmd(
                "Git",
                name,
                desc,
                &["Any"],
                vec![CommandStep::new("git", args)],
                "{ProjectRoot}",
            );
            spec.vcs = vec!["git".to_string()];
            spec
        };
        commands.push(git("Status", "git status", &["status"]));
        commands.push(git("Add", "git add the current file", &["add", "{FilePath}"]));
        commands.push(git("Diff", "git diff the current file", &["diff", "{FilePath}"]));
        let mut commit = git("Commit", "commit all changes", &["commit", "-am", "{PromptString1}"]);
        commit.confirm = true;
        commands.push(commit);
        let mut pull_push = git("Pull Push", "pull then push", &["pull"]);
        pull_push.steps.push(CommandStep::new("git", &["push"]));
        pull_push.wait = true;
        commands.push(pull_push);

        Self::new(commands)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn labels(menu: &[MenuGroup]) -> Vec<String> {
        menu.iter()
            .flat_map(|g| g.commands.iter().map(|c| c.label()))
            .collect()
    }

    #[test]
    fn split_labels() {
        assert_eq!(split_label("Build: Make").unwrap(), ("Build", "Make"));
        assert!(split_label("Build").is_err());
        assert!(split_label(": Make").is_err());
    }

    #[test]
    fn lookup_by_label() {
        let registry = CommandRegistry::defaults();
        assert_eq!(registry.get("Git: Status").unwrap().name, "Status");
        assert!(matches!(
            registry.get("Git: Nope"),
            Err(CommandError::UnknownCommand(_))
        ));
    }

    #[test]
    fn insert_replaces_same_label() {
        let mut registry = CommandRegistry::default();
        registry.insert(CommandSpec::new("A", "x", vec![]));
        let mut replacement = CommandSpec::new("A", "x", vec![]);
        replacement.desc = "new".to_string();
        registry.insert(replacement);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("A: x").unwrap().desc, "new");
        assert!(registry.remove("A: x").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn menu_ordering() {
        let registry = CommandRegistry::new(vec![
            CommandSpec::new("Zeta", "b", vec![]),
            CommandSpec::new("Zeta", "a", vec![]),
            CommandSpec::new("Alpha", "x", vec![]),
            CommandSpec::new("Git", "Status", vec![]),
            CommandSpec::new("Build", "Make", vec![]),
        ]);

        let menu = registry.menu(Some("Go"), Some("git"));
        let categories: Vec<_> = menu.iter().map(|g| g.category).collect();
        assert_eq!(categories, vec!["Build", "Git", "Alpha", "Zeta"]);
        assert_eq!(
            labels(&menu),
            vec!["Build: Make", "Git: Status", "Alpha: x", "Zeta: a", "Zeta: b"]
        );

        let menu = registry.menu(Some("Go"), None);
        let categories: Vec<_> = menu.iter().map(|g| g.category).collect();
        assert_eq!(categories, vec!["Build", "Alpha", "Git", "Zeta"]);
    }

    #[test]
    fn menu_filters_language_and_vcs() {
        let registry = CommandRegistry::defaults();

        let rust = labels(&registry.menu(Some("Rust"), Some("git")));
        assert!(rust.contains(&"Build: Cargo Build".to_string()));
        assert!(!rust.contains(&"Build: Go Build Proj".to_string()));
        assert!(rust.contains(&"Git: Status".to_string()));

        let no_vcs = labels(&registry.menu(Some("Rust"), Some("svn")));
        assert!(!no_vcs.iter().any(|l| l.starts_with("Git:")));
    }

    #[test]
    fn table_round_trip() {
        let registry = CommandRegistry::defaults();
        let mut buf = Vec::new();
        registry.save(&mut buf).unwrap();
        let loaded = CommandRegistry::load(Cursor::new(buf)).unwrap();
        assert_eq!(loaded.len(), registry.len());
        assert_eq!(
            loaded.get("Git: Commit").unwrap(),
            registry.get("Git: Commit").unwrap()
        );
    }

    #[test]
    fn load_malformed_table() {
        assert!(CommandRegistry::load(Cursor::new(b"[{]")).is_err());
    }
}
