//! Autosave sidecars: `#name#` next to the file they back up.

use std::{
    io,
    path::{Path, PathBuf},
};

use crate::{DocumentError, buffer::Buffer};

/// Sidecar path for `path`
pub fn autosave_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("#{name}#"))
}

/// Whether `name` is itself a sidecar name
pub fn is_autosave_name(name: &str) -> bool {
    name.len() > 2 && name.starts_with('#') && name.ends_with('#')
}

pub fn write_autosave(path: &Path, text: &str) -> Result<PathBuf, DocumentError> {
    let sidecar = autosave_path(path);
    std::fs::write(&sidecar, text).map_err(|source| DocumentError::Write {
        path: sidecar.clone(),
        source,
    })?;
    tracing::trace!(sidecar = %sidecar.display(), "wrote autosave");
    Ok(sidecar)
}

/// Delete the sidecar of `path`, returning whether there was one
pub fn remove_autosave(path: &Path) -> Result<bool, DocumentError> {
    let sidecar = autosave_path(path);
    match std::fs::remove_file(&sidecar) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(DocumentError::Write {
            path: sidecar,
            source,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosaveChoice {
    Discard,
    OpenSeparately,
}

/// Asks the user what to do with a sidecar found when opening a file
pub trait AutosavePrompt {
    fn autosave_found(&self, path: &Path, sidecar: &Path) -> AutosaveChoice;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// No sidecar, or the buffer already has unsaved changes
    Nothing,
    Discarded,
    /// Open the sidecar at this path in its own view
    OpenSeparately(PathBuf),
}

/// Check a freshly opened buffer for a leftover sidecar
pub fn reconcile_on_open(
    buffer: &dyn Buffer,
    prompt: &dyn AutosavePrompt,
) -> Result<Reconciled, DocumentError> {
    let path = buffer.path();
    if is_autosave_name(&buffer.name()) || buffer.is_dirty() {
        return Ok(Reconciled::Nothing);
    }
    let sidecar = autosave_path(&path);
    if !sidecar.is_file() {
        return Ok(Reconciled::Nothing);
    }

    tracing::debug!(path = %path.display(), "found autosave sidecar");
    match prompt.autosave_found(&path, &sidecar) {
        AutosaveChoice::Discard => {
            remove_autosave(&path)?;
            Ok(Reconciled::Discarded)
        }
        AutosaveChoice::OpenSeparately => Ok(Reconciled::OpenSeparately(sidecar)),
    }
}
