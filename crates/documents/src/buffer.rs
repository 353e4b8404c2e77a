use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
    time::SystemTime,
};

use regex::Regex;

use crate::{
    DocumentError,
    autosave::{self, is_autosave_name},
    lang::Language,
    region::{Pos, Region, TextEdit},
    search::{find_regions, literal_regex, region_offsets},
};

/// The text and metadata of one open file, shared between every view of it.
///
/// Implementations serialize their own mutations; callers never hold a lock
/// of theirs across these calls.
pub trait Buffer: Send + Sync + fmt::Debug {
    fn path(&self) -> PathBuf;

    /// File name shown in tabs and used for name lookups
    fn name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Whether there are unsaved changes
    fn is_dirty(&self) -> bool;

    fn language(&self) -> Option<Language>;

    /// Time of the most recent modification, in memory or on disk
    fn mod_time(&self) -> Option<SystemTime>;

    /// Whether the buffer still belongs to the project's file tree
    fn is_attached(&self) -> bool;

    fn save(&self) -> Result<(), DocumentError>;

    /// Discard unsaved changes and reload from disk
    fn revert(&self) -> Result<(), DocumentError>;

    fn close(&self);

    fn text(&self) -> String;

    /// Replace the text in `region` with `text`, returning the applied edit.
    ///
    /// With `match_case` the replacement takes on the case of the text it
    /// replaces.
    fn replace_text(
        &self,
        region: Region,
        text: &str,
        match_case: bool,
    ) -> Result<TextEdit, DocumentError>;

    /// Regions matching a literal pattern
    fn search(&self, pattern: &str, ignore_case: bool) -> Vec<Region> {
        match literal_regex(pattern, ignore_case) {
            Ok(re) => self.search_regex(&re),
            Err(e) => {
                tracing::warn!(error = %e, %pattern, "literal pattern did not compile");
                Vec::new()
            }
        }
    }

    fn search_regex(&self, re: &Regex) -> Vec<Region> {
        find_regions(&self.text(), re)
    }

    /// Regions the editor should highlight, e.g. find results
    fn set_highlights(&self, regions: Vec<Region>);

    fn highlights(&self) -> Vec<Region>;
}

/// Adapt the case of `replacement` to that of `original`
pub fn match_case(original: &str, replacement: &str) -> String {
    let letters: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return replacement.to_string();
    }
    if letters.iter().all(|c| c.is_uppercase()) && letters.len() > 1 {
        return replacement.to_uppercase();
    }
    if letters.iter().all(|c| c.is_lowercase()) {
        return replacement.to_lowercase();
    }
    if letters[0].is_uppercase() && letters[1..].iter().all(|c| c.is_lowercase()) {
        let mut chars = replacement.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => String::new(),
        };
    }
    replacement.to_string()
}

/// End position of `text` inserted at `start`
fn end_of_insert(start: Pos, text: &str) -> Pos {
    match text.rsplit_once('\n') {
        Some((head, tail)) => Pos::new(
            start.line + head.matches('\n').count() + 1,
            tail.chars().count(),
        ),
        None => Pos::new(start.line, start.col + text.chars().count()),
    }
}

#[derive(Debug)]
struct Contents {
    text: String,
    dirty: bool,
    attached: bool,
    mod_time: Option<SystemTime>,
    highlights: Vec<Region>,
}

/// A [`Buffer`] held in memory and saved to its path on disk
#[derive(Debug)]
pub struct MemoryBuffer {
    path: PathBuf,
    language: Option<Language>,
    autosave: bool,
    contents: Mutex<Contents>,
}

fn read_text(path: &Path) -> Result<(String, Option<SystemTime>), DocumentError> {
    let read_error = |source| DocumentError::Read {
        path: path.to_path_buf(),
        source,
    };
    let bytes = std::fs::read(path).map_err(read_error)?;
    let mod_time = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(read_error)?;
    Ok((String::from_utf8_lossy(&bytes).into_owned(), Some(mod_time)))
}

impl MemoryBuffer {
    /// Load `path` from disk
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DocumentError> {
        let path = path.into();
        let (text, mod_time) = read_text(&path)?;
        tracing::debug!(path = %path.display(), "opened buffer");
        Ok(Self::with_contents(path, text, mod_time, false))
    }

    /// A buffer for `path` whose contents have not been saved yet
    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self::with_contents(path.into(), text.into(), Some(SystemTime::now()), true)
    }

    fn with_contents(
        path: PathBuf,
        text: String,
        mod_time: Option<SystemTime>,
        dirty: bool,
    ) -> Self {
        let autosave = !path
            .file_name()
            .is_some_and(|n| is_autosave_name(&n.to_string_lossy()));
        Self {
            language: Language::from_path(&path),
            path,
            autosave,
            contents: Mutex::new(Contents {
                text,
                dirty,
                attached: true,
                mod_time,
                highlights: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Contents> {
        self.contents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the whole text, as an editor edit would
    pub fn set_text(&self, text: impl Into<String>) {
        let mut contents = self.lock();
        contents.text = text.into();
        contents.dirty = true;
        contents.mod_time = Some(SystemTime::now());
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.lock().dirty = dirty;
    }

    /// Whether unsaved changes are backed up to a sidecar
    pub fn autosave_enabled(&self) -> bool {
        self.autosave
    }

    /// Write the sidecar for unsaved changes; returns whether one was written
    pub fn autosave(&self) -> Result<bool, DocumentError> {
        if !self.autosave {
            return Ok(false);
        }
        let text = {
            let contents = self.lock();
            if !contents.dirty {
                return Ok(false);
            }
            contents.text.clone()
        };
        autosave::write_autosave(&self.path, &text)?;
        Ok(true)
    }
}

impl Buffer for MemoryBuffer {
    fn path(&self) -> PathBuf {
        self.path.clone()
    }

    fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    fn language(&self) -> Option<Language> {
        self.language
    }

    fn mod_time(&self) -> Option<SystemTime> {
        self.lock().mod_time
    }

    fn is_attached(&self) -> bool {
        self.lock().attached
    }

    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    fn save(&self) -> Result<(), DocumentError> {
        let mut contents = self.lock();
        if !contents.attached {
            return Err(DocumentError::Detached(self.path.clone()));
        }
        std::fs::write(&self.path, &contents.text).map_err(|source| DocumentError::Write {
            path: self.path.clone(),
            source,
        })?;
        contents.dirty = false;
        contents.mod_time = Some(SystemTime::now());
        drop(contents);

        tracing::debug!("saved buffer");
        autosave::remove_autosave(&self.path)?;
        Ok(())
    }

    fn revert(&self) -> Result<(), DocumentError> {
        let (text, mod_time) = read_text(&self.path)?;
        {
            let mut contents = self.lock();
            contents.text = text;
            contents.dirty = false;
            contents.mod_time = mod_time;
        }
        autosave::remove_autosave(&self.path)?;
        Ok(())
    }

    fn close(&self) {
        tracing::debug!(path = %self.path.display(), "closing buffer");
        self.lock().attached = false;
    }

    fn text(&self) -> String {
        self.lock().text.clone()
    }

    fn replace_text(
        &self,
        region: Region,
        text: &str,
        match_case_flag: bool,
    ) -> Result<TextEdit, DocumentError> {
        let mut contents = self.lock();
        let (start, end) = region_offsets(&contents.text, region)
            .ok_or(DocumentError::InvalidRegion(region))?;
        let replacement = if match_case_flag {
            match_case(&contents.text[start..end], text)
        } else {
            text.to_string()
        };
        contents.text.replace_range(start..end, &replacement);
        contents.dirty = true;
        contents.mod_time = Some(SystemTime::now());
        Ok(TextEdit {
            region,
            end: end_of_insert(region.start, &replacement),
        })
    }

    fn set_highlights(&self, regions: Vec<Region>) {
        self.lock().highlights = regions;
    }

    fn highlights(&self) -> Vec<Region> {
        self.lock().highlights.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_matching() {
        assert_eq!(match_case("FOO", "bar"), "BAR");
        assert_eq!(match_case("Foo", "bar"), "Bar");
        assert_eq!(match_case("foo", "Bar"), "bar");
        assert_eq!(match_case("fOo", "bar"), "bar");
        assert_eq!(match_case("123", "bar"), "bar");
    }

    #[test]
    fn replace_reports_edit() {
        let buf = MemoryBuffer::from_text("/tmp/x.go", "foo bar\nfoo");
        buf.set_dirty(false);

        let edit = buf
            .replace_text(Region::on_line(0, 4, 7), "baz\nqux", false)
            .unwrap();
        assert_eq!(edit.end, Pos::new(1, 3));
        assert_eq!(buf.text(), "foo baz\nqux\nfoo");
        assert!(buf.is_dirty());

        let edit = buf
            .replace_text(Region::on_line(2, 0, 3), "bar", true)
            .unwrap();
        assert_eq!(edit.end, Pos::new(2, 3));
        assert_eq!(buf.text(), "foo baz\nqux\nbar");

        assert!(matches!(
            buf.replace_text(Region::on_line(9, 0, 1), "x", false),
            Err(DocumentError::InvalidRegion(_))
        ));
    }

    #[test]
    fn search_default_methods() {
        let buf = MemoryBuffer::from_text("/tmp/x.rs", "Foo foo FOO");
        assert_eq!(buf.search("foo", false).len(), 1);
        assert_eq!(buf.search("foo", true).len(), 3);
        assert_eq!(buf.language(), Some(Language::Rust));
    }

    #[test]
    fn save_and_revert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.go");
        std::fs::write(&path, "package main\n").unwrap();

        let buf = MemoryBuffer::open(&path).unwrap();
        assert!(!buf.is_dirty());

        buf.set_text("package other\n");
        assert!(buf.autosave().unwrap());
        assert!(autosave::autosave_path(&path).exists());

        buf.revert().unwrap();
        assert_eq!(buf.text(), "package main\n");
        assert!(!autosave::autosave_path(&path).exists());

        buf.set_text("package saved\n");
        buf.save().unwrap();
        assert!(!buf.is_dirty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "package saved\n");
    }

    #[test]
    fn sidecars_do_not_autosave() {
        let buf = MemoryBuffer::from_text("/tmp/#main.go#", "x");
        assert!(!buf.autosave_enabled());
        assert!(!buf.autosave().unwrap());
    }

    #[test]
    fn closed_buffers_refuse_save() {
        let dir = tempfile::tempdir().unwrap();
        let buf = MemoryBuffer::from_text(dir.path().join("a.txt"), "x");
        buf.close();
        assert!(!buf.is_attached());
        assert!(matches!(buf.save(), Err(DocumentError::Detached(_))));
    }
}
