use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{DocumentError, buffer::Buffer};

/// Answer to the unsaved-changes question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveChoice {
    Cancel,
    Discard,
    SaveAll,
}

/// Asks the user what to do with unsaved buffers
pub trait SaveAllPrompt {
    /// `changed` buffers are dirty; `Cancel` is only offered when `can_cancel`
    fn unsaved_changes(&self, changed: usize, can_cancel: bool) -> SaveChoice;
}

fn same_buffer(a: &Arc<dyn Buffer>, b: &Arc<dyn Buffer>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Open buffers in recency order, most recently used first
#[derive(Debug, Default)]
pub struct OpenDocs {
    docs: Mutex<Vec<Arc<dyn Buffer>>>,
}

impl OpenDocs {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn Buffer>>> {
        self.docs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hold the list with detached buffers already dropped
    fn live(&self) -> MutexGuard<'_, Vec<Arc<dyn Buffer>>> {
        let mut docs = self.lock();
        let before = docs.len();
        docs.retain(|b| b.is_attached());
        if docs.len() != before {
            tracing::debug!(purged = before - docs.len(), "purged detached buffers");
        }
        docs
    }

    /// Move `buffer` to the front, returning true if it was not yet open
    pub fn add(&self, buffer: Arc<dyn Buffer>) -> bool {
        let mut docs = self.lock();
        match docs.iter().position(|b| same_buffer(b, &buffer)) {
            Some(0) => false,
            Some(i) => {
                let existing = docs.remove(i);
                docs.insert(0, existing);
                false
            }
            None => {
                docs.insert(0, buffer);
                true
            }
        }
    }

    pub fn remove(&self, buffer: &Arc<dyn Buffer>) -> bool {
        let mut docs = self.lock();
        match docs.iter().position(|b| same_buffer(b, buffer)) {
            Some(i) => {
                docs.remove(i);
                true
            }
            None => false,
        }
    }

    /// Drop every buffer detached from the file tree
    pub fn purge(&self) {
        drop(self.live());
    }

    pub fn buffers(&self) -> Vec<Arc<dyn Buffer>> {
        self.live().clone()
    }

    /// Tab names, marking unsaved buffers with a trailing `*`
    pub fn names(&self) -> Vec<String> {
        self.live()
            .iter()
            .map(|b| {
                if b.is_dirty() {
                    format!("{}*", b.name())
                } else {
                    b.name()
                }
            })
            .collect()
    }

    /// Number of buffers with unsaved changes
    pub fn n_changed(&self) -> usize {
        self.live().iter().filter(|b| b.is_dirty()).count()
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn Buffer>> {
        let name = name.strip_suffix('*').unwrap_or(name);
        self.live().iter().find(|b| b.name() == name).cloned()
    }

    pub fn by_path(&self, path: &Path) -> Option<Arc<dyn Buffer>> {
        self.live().iter().find(|b| b.path() == path).cloned()
    }

    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Save every dirty buffer, calling `after_save` for each one saved
    pub fn save_all(&self, after_save: &mut dyn FnMut(&dyn Buffer)) -> Result<usize, DocumentError> {
        let dirty: Vec<_> = self.buffers().into_iter().filter(|b| b.is_dirty()).collect();
        for buffer in &dirty {
            buffer.save()?;
            after_save(buffer.as_ref());
        }
        Ok(dirty.len())
    }

    /// Make sure unsaved changes are dealt with before running `then`.
    ///
    /// Returns false, after running `then`, when nothing is unsaved. Otherwise
    /// asks `prompt` and returns true; `then` runs unless the user cancelled.
    #[tracing::instrument(skip_all, fields(can_cancel))]
    pub fn save_all_check(
        &self,
        can_cancel: bool,
        prompt: &dyn SaveAllPrompt,
        after_save: &mut dyn FnMut(&dyn Buffer),
        then: impl FnOnce(),
    ) -> Result<bool, DocumentError> {
        let changed = self.n_changed();
        if changed == 0 {
            then();
            return Ok(false);
        }

        match prompt.unsaved_changes(changed, can_cancel) {
            SaveChoice::Cancel if can_cancel => {
                tracing::debug!("save cancelled");
            }
            SaveChoice::Cancel | SaveChoice::Discard => {
                tracing::debug!(changed, "discarding unsaved changes");
                then();
            }
            SaveChoice::SaveAll => {
                let saved = self.save_all(after_save)?;
                tracing::debug!(saved, "saved all buffers");
                then();
            }
        }
        Ok(true)
    }
}
