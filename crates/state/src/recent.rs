use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_RECENT: usize = 25;

fn default_max() -> usize {
    DEFAULT_MAX_RECENT
}

/// Recently used paths, most recent first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentPaths {
    #[serde(default)]
    paths: Vec<PathBuf>,
    #[serde(default = "default_max")]
    max: usize,
}

impl Default for RecentPaths {
    fn default() -> Self {
        Self::with_max(DEFAULT_MAX_RECENT)
    }
}

impl RecentPaths {
    pub fn with_max(max: usize) -> Self {
        Self {
            paths: Vec::new(),
            max,
        }
    }

    /// Move `path` to the front, dropping the oldest entries beyond the cap
    pub fn add(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.paths.retain(|p| *p != path);
        self.paths.insert(0, path);
        self.paths.truncate(self.max);
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.paths.len();
        self.paths.retain(|p| p != path);
        self.paths.len() != before
    }

    /// Drop entries that no longer exist on disk
    pub fn prune_missing(&mut self) {
        self.paths.retain(|p| p.exists());
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn set_max(&mut self, max: usize) {
        self.max = max;
        self.paths.truncate(max);
    }
}
