use std::{fs::File, io::Read, path::Path};

use documents::{Language, is_autosave_name};

use crate::request::{FindConfig, FindRequest};

/// Bytes sniffed when deciding whether a file is binary
const SNIFF_LEN: usize = 8 * 1024;

/// Why a file was left out of a find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooBig,
    Language,
    ProjectFile,
    Binary,
    Autosave,
}

/// Whether the start of the file contains a NUL byte
pub fn is_binary(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut buf = Vec::with_capacity(SNIFF_LEN);
    match file.take(SNIFF_LEN as u64).read_to_end(&mut buf) {
        Ok(_) => buf.contains(&0),
        Err(_) => false,
    }
}

/// Decide whether `path` is left out of a find.
///
/// Files with an open buffer are searched in memory, so only their name
/// and language are checked.
pub fn skip_reason(
    path: &Path,
    size: u64,
    has_buffer: bool,
    request: &FindRequest,
    config: &FindConfig,
) -> Option<SkipReason> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    if is_autosave_name(&name) {
        return Some(SkipReason::Autosave);
    }
    if !config.project_ext.is_empty() && name.ends_with(config.project_ext.as_str()) {
        return Some(SkipReason::ProjectFile);
    }
    if !request.wants_language(Language::from_path(path)) {
        return Some(SkipReason::Language);
    }
    if has_buffer {
        return None;
    }
    if size > config.big_file_size {
        return Some(SkipReason::TooBig);
    }
    if is_binary(path) {
        return Some(SkipReason::Binary);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FindLoc;

    #[test]
    fn skips() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("main.go");
        std::fs::write(&text, "package main\n").unwrap();
        let bin = dir.path().join("prog");
        std::fs::write(&bin, b"\x7fELF\x00\x01").unwrap();

        let mut req = FindRequest::new("x", FindLoc::All);
        let config = FindConfig {
            big_file_size: 100,
            ..Default::default()
        };

        assert_eq!(skip_reason(&text, 13, false, &req, &config), None);
        assert_eq!(skip_reason(&text, 101, false, &req, &config), Some(SkipReason::TooBig));
        assert_eq!(skip_reason(&text, 101, true, &req, &config), None);
        assert_eq!(skip_reason(&bin, 6, false, &req, &config), Some(SkipReason::Binary));
        assert_eq!(
            skip_reason(&dir.path().join("#main.go#"), 1, false, &req, &config),
            Some(SkipReason::Autosave)
        );
        assert_eq!(
            skip_reason(&dir.path().join("proj.workbench"), 1, false, &req, &config),
            Some(SkipReason::ProjectFile)
        );

        req.langs.insert(Language::Rust);
        assert_eq!(skip_reason(&text, 13, false, &req, &config), Some(SkipReason::Language));
    }
}
