use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use debugger::{DebugMode, DebugParams};
use eyre::Context;
use find::FindRequest;
use serde::{Deserialize, Serialize};

/// Extension of project files
pub const PROJECT_EXT: &str = "workbench";

/// Open state of file tree directories, keyed by path relative to the
/// project root
pub type DirsOpen = BTreeMap<String, bool>;

/// Debugger settings as stored in the project file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct DebugSettings {
    pub mode: DebugMode,
    pub pid: u32,
    /// Debugger arguments, then `--`, then program arguments
    pub args: Vec<String>,
    pub test_run: String,
}

impl DebugSettings {
    pub fn params(&self) -> DebugParams {
        let (debug_args, args) = DebugParams::split_args(&self.args);
        DebugParams {
            mode: self.mode,
            pid: self.pid,
            debug_args,
            args,
            test_run: self.test_run.clone(),
        }
    }

    pub fn from_params(params: &DebugParams) -> Self {
        Self {
            mode: params.mode,
            pid: params.pid,
            args: params.combined_args(),
            test_run: params.test_run.clone(),
        }
    }
}

/// Last symbol search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SymbolParams {
    pub name: String,
    pub kind: String,
}

/// Everything saved in a project file, stored as TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ProjectSettings {
    pub project_root: PathBuf,
    pub project_filename: PathBuf,
    pub main_lang: String,
    pub version_control: String,
    pub go_mod: bool,
    pub build_dir: PathBuf,
    pub build_targ: PathBuf,
    pub run_exec: PathBuf,
    pub last_register: String,
    pub split_name: String,
    /// `Category: Name` labels of the toolbar build commands
    pub build_cmds: Vec<String>,
    pub run_cmds: Vec<String>,
    pub debug: DebugSettings,
    pub find_params: FindRequest,
    pub symbol_params: SymbolParams,
    pub dirs_open: DirsOpen,
    /// Splitter proportions by splitter name
    pub splitters: BTreeMap<String, Vec<f64>>,
}

impl ProjectSettings {
    /// Fresh settings for the project in `root`; the project file is named
    /// after the directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        Self {
            project_filename: root.join(format!("{name}.{PROJECT_EXT}")),
            build_dir: root.clone(),
            project_root: root,
            ..Default::default()
        }
    }

    /// Fresh settings with language and version control guessed from the
    /// files in `root`
    pub fn detect(root: impl Into<PathBuf>) -> Self {
        let mut settings = Self::new(root);
        let root = settings.project_root.clone();
        if root.join(".git").exists() {
            settings.version_control = "git".to_string();
        }
        if root.join("go.mod").is_file() {
            settings.main_lang = "Go".to_string();
            settings.go_mod = true;
            settings.build_cmds = vec!["Build: Go Build Proj".to_string()];
        } else if root.join("Cargo.toml").is_file() {
            settings.main_lang = "Rust".to_string();
            settings.build_cmds = vec!["Build: Cargo Build".to_string()];
        }
        settings.run_cmds = vec!["Run: Run Exec".to_string()];
        settings
    }

    /// Parse a project file, filling in the paths it was loaded from when
    /// they are missing
    pub fn parse(text: &str, path: &Path) -> eyre::Result<Self> {
        let mut settings: Self = toml::from_str(text).context("parsing project file")?;
        settings.version_control = settings.version_control.to_lowercase();
        if settings.project_filename.as_os_str().is_empty() {
            settings.project_filename = path.to_path_buf();
        }
        if settings.project_root.as_os_str().is_empty() {
            settings.project_root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        }
        Ok(settings)
    }

    pub fn load_from(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading project file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded project file");
        Self::parse(&text, path)
    }

    pub fn to_toml(&self) -> eyre::Result<String> {
        toml::to_string_pretty(self).context("serializing project settings")
    }

    /// Write to `ProjectFilename`
    pub fn save(&self) -> eyre::Result<()> {
        let text = self.to_toml()?;
        std::fs::write(&self.project_filename, text).with_context(|| {
            format!("writing project file {}", self.project_filename.display())
        })?;
        tracing::debug!(path = %self.project_filename.display(), "saved project file");
        Ok(())
    }

    fn dir_key(&self, dir: &Path) -> String {
        dir.strip_prefix(&self.project_root)
            .unwrap_or(dir)
            .to_string_lossy()
            .into_owned()
    }

    /// Whether the file tree shows `dir` expanded
    pub fn dir_open(&self, dir: &Path) -> bool {
        self.dirs_open
            .get(&self.dir_key(dir))
            .copied()
            .unwrap_or(false)
    }

    pub fn set_dir_open(&mut self, dir: &Path, open: bool) {
        let key = self.dir_key(dir);
        self.dirs_open.insert(key, open);
    }

    pub fn debug_params(&self) -> DebugParams {
        self.debug.params()
    }

    /// Project executable, relative paths taken from the build directory
    pub fn exe_path(&self) -> PathBuf {
        let dir = if self.build_dir.is_absolute() {
            self.build_dir.clone()
        } else {
            self.project_root.join(&self.build_dir)
        };
        dir.join(&self.run_exec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use find::FindLoc;

    fn sample(root: &Path) -> ProjectSettings {
        let mut settings = ProjectSettings::new(root);
        settings.main_lang = "Go".to_string();
        settings.version_control = "git".to_string();
        settings.go_mod = true;
        settings.build_cmds = vec!["Build: Go Build Proj".to_string()];
        settings.run_exec = PathBuf::from("app");
        settings.debug = DebugSettings {
            mode: DebugMode::Test,
            pid: 0,
            args: vec!["--check-go-version=false".into(), "--".into(), "-v".into()],
            test_run: "TestParse".to_string(),
        };
        settings.find_params = FindRequest::new("needle", FindLoc::All);
        settings.set_dir_open(&root.join("cmd"), true);
        settings
            .splitters
            .insert("main".to_string(), vec![0.2, 0.5, 0.3]);
        settings
    }

    #[test]
    fn round_trips_through_toml() {
        let root = Path::new("/work/app");
        let settings = sample(root);
        let text = settings.to_toml().unwrap();
        assert!(text.contains("ProjectRoot = "));
        assert!(text.contains("[Debug]"));

        let loaded = ProjectSettings::parse(&text, &settings.project_filename).unwrap();
        assert_eq!(loaded, settings);
        // stable: serializing again gives the same text
        assert_eq!(loaded.to_toml().unwrap(), text);
    }

    #[test]
    fn version_control_is_lowercased() {
        let loaded = ProjectSettings::parse(
            "VersionControl = \"Git\"\n",
            Path::new("/work/app/app.workbench"),
        )
        .unwrap();
        assert_eq!(loaded.version_control, "git");
        assert_eq!(loaded.project_root, PathBuf::from("/work/app"));
        assert_eq!(
            loaded.project_filename,
            PathBuf::from("/work/app/app.workbench")
        );
    }

    #[test]
    fn debug_args_split_at_separator() {
        let settings = sample(Path::new("/work/app"));
        let params = settings.debug_params();
        assert_eq!(params.mode, DebugMode::Test);
        assert_eq!(params.debug_args, vec!["--check-go-version=false"]);
        assert_eq!(params.args, vec!["-v"]);
        assert_eq!(DebugSettings::from_params(&params), settings.debug);
    }

    #[test]
    fn dirs_open_relative_to_root() {
        let root = Path::new("/work/app");
        let settings = sample(root);
        assert!(settings.dir_open(&root.join("cmd")));
        assert!(!settings.dir_open(&root.join("internal")));
        assert_eq!(settings.dirs_open.keys().collect::<Vec<_>>(), vec!["cmd"]);
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = sample(dir.path());
        settings.save().unwrap();
        assert!(settings.project_filename.exists());

        let loaded = ProjectSettings::load_from(&settings.project_filename).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.exe_path(), dir.path().join("app"));
    }

    #[test]
    fn detects_go_module() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("go.mod"), "module example.com/app\n").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();

        let settings = ProjectSettings::detect(dir.path());
        assert_eq!(settings.main_lang, "Go");
        assert!(settings.go_mod);
        assert_eq!(settings.version_control, "git");
        assert_eq!(settings.build_cmds, vec!["Build: Go Build Proj"]);
        assert!(
            settings
                .project_filename
                .to_string_lossy()
                .ends_with(".workbench")
        );
    }
}
