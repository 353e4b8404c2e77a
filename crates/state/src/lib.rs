//! Persisted editor state: the project file, recently opened projects and
//! per-language options.

use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
};

use eyre::Context;
use serde::{Serialize, de::DeserializeOwned};

mod lang_opts;
mod project;
mod recent;

pub use lang_opts::{LangOptions, LangOpts};
pub use project::{DebugSettings, DirsOpen, ProjectSettings, SymbolParams};
pub use recent::{DEFAULT_MAX_RECENT, RecentPaths};

/// A JSON document on disk together with its current contents
pub struct StateManager<T> {
    save_path: PathBuf,
    current: T,
}

impl<T> StateManager<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Load the document at `path`, creating it with default contents if it
    /// cannot be read
    pub fn new(path: impl Into<PathBuf>) -> eyre::Result<Self> {
        let path = path.into();
        let span = tracing::debug_span!("StateManager", state_path = %path.display());
        let _guard = span.enter();

        tracing::debug!("attempting to load state");
        match crate::load_from(&path) {
            Ok(state) => {
                tracing::debug!("state loaded");
                Ok(Self {
                    save_path: path,
                    current: state,
                })
            }
            Err(e) => {
                tracing::debug!(error = %e, "loading state file, writing defaults");
                let state = T::default();
                crate::save_to(&state, &path).wrap_err("saving state file")?;

                Ok(Self {
                    save_path: path,
                    current: state,
                })
            }
        }
    }

    pub fn load(mut self) -> eyre::Result<Self> {
        let state = crate::load_from(&self.save_path).wrap_err("loading state")?;
        self.current = state;
        Ok(self)
    }

    pub fn save(&self) -> eyre::Result<()> {
        crate::save_to(&self.current, &self.save_path).wrap_err("saving state")
    }

    pub fn current(&self) -> &T {
        &self.current
    }

    /// Change the contents and write them back
    pub fn update<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> eyre::Result<R> {
        let result = f(&mut self.current);
        self.save()?;
        Ok(result)
    }

    pub fn path(&self) -> &Path {
        &self.save_path
    }
}

/// Directory holding the per-user state files
pub fn config_dir() -> eyre::Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| eyre::eyre!("cannot determine the user config directory"))?;
    Ok(dir.join("workbench"))
}

pub fn save<T: Serialize>(state: &T, writer: impl Write) -> eyre::Result<()> {
    serde_json::to_writer_pretty(writer, state).context("writing state")?;
    Ok(())
}

pub fn save_to<T: Serialize>(state: &T, path: impl AsRef<Path>) -> eyre::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating state directory {}", parent.display()))?;
    }
    let f = std::fs::File::create(path).context("creating file for saving")?;
    save(state, &f).context("saving state")?;
    Ok(())
}

pub fn load<T: DeserializeOwned>(reader: impl Read) -> eyre::Result<T> {
    let st = serde_json::from_reader(reader).context("reading state")?;
    Ok(st)
}

pub fn load_from<T: DeserializeOwned>(path: impl AsRef<Path>) -> eyre::Result<T> {
    let path = path.as_ref();
    let f = std::fs::File::open(path)
        .with_context(|| format!("opening save state {}", path.display()))?;
    let state = load(f).context("reading from state file")?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip_save_and_load() {
        let mut recent = RecentPaths::default();
        recent.add("/work/a/a.workbench");
        recent.add("/work/b/b.workbench");

        let mut buf = Vec::new();
        save(&recent, &mut buf).unwrap();

        let loaded: RecentPaths = load(Cursor::new(&buf)).unwrap();
        assert_eq!(loaded, recent);
    }

    #[test]
    fn load_malformed_json() {
        let bad_json = Cursor::new(b"not valid json {{{");
        let result: eyre::Result<RecentPaths> = load(bad_json);
        assert!(result.is_err());
    }

    #[test]
    fn load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result: eyre::Result<RecentPaths> = load_from(dir.path().join("missing.json"));
        assert!(result.is_err());
    }

    #[test]
    fn state_manager_creates_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("recent.json");

        let manager: StateManager<RecentPaths> = StateManager::new(&path).unwrap();
        assert!(manager.current().paths().is_empty());

        // File should have been created
        assert!(path.exists());
    }

    #[test]
    fn state_manager_update_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recent.json");

        let mut manager: StateManager<RecentPaths> = StateManager::new(&path).unwrap();
        manager.update(|r| r.add("/work/p.workbench")).unwrap();

        let manager = manager.load().unwrap();
        assert_eq!(
            manager.current().paths(),
            &[PathBuf::from("/work/p.workbench")]
        );
    }

    #[test]
    fn load_empty_json_object() {
        let loaded: RecentPaths = load(Cursor::new(b"{}")).unwrap();
        assert!(loaded.paths().is_empty());
        assert_eq!(loaded.max(), DEFAULT_MAX_RECENT);
    }
}
