use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use documents::{Buffer, Region};

use crate::{link::FindLink, request::FindRequest};

/// Matches within one file
#[derive(Debug, Clone)]
pub struct FileResult {
    pub path: PathBuf,
    pub count: usize,
    pub regions: Vec<Region>,
    /// Text of the line each match starts on
    pub lines: Vec<String>,
    /// Buffer that was searched instead of the file on disk
    pub buffer: Option<Arc<dyn Buffer>>,
}

#[derive(Debug, Clone, Default)]
pub struct FindResults {
    pub request: FindRequest,
    /// Sorted by descending match count
    pub files: Vec<FileResult>,
}

impl FindResults {
    pub fn total(&self) -> usize {
        self.files.iter().map(|f| f.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file(&self, path: &Path) -> Option<&FileResult> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Lay out the results buffer: a `[count] path` header per file followed
    /// by one `link<TAB>line text` entry per match.
    pub fn render(&self) -> ResultsView {
        let mut lines = Vec::with_capacity(self.files.len() + self.total());
        for file in &self.files {
            lines.push(format!("[{}] {}", file.count, file.path.display()));
            let results_line = lines.len();
            for (region, text) in file.regions.iter().zip(&file.lines) {
                let link = FindLink {
                    path: file.path.clone(),
                    results_line,
                    count: file.count,
                    region: *region,
                };
                lines.push(format!("{link}\t{}", text.trim()));
            }
        }
        ResultsView { lines }
    }
}

/// The results buffer, one entry per line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultsView {
    lines: Vec<String>,
}

impl ResultsView {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn text(&self) -> String {
        self.lines.iter().map(|l| format!("{l}\n")).collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The link on `line`, if that line is a match entry
    pub fn link_at(&self, line: usize) -> Option<FindLink> {
        let entry = self.lines.get(line)?;
        let link = entry.split('\t').next()?;
        link.parse().ok()
    }

    /// First match entry at or after `line`
    pub fn next_link(&self, line: usize) -> Option<usize> {
        (line..self.lines.len()).find(|&i| self.link_at(i).is_some())
    }

    /// Every link still listed for `path`
    pub fn links_for(&self, path: &Path) -> Vec<FindLink> {
        (0..self.lines.len())
            .filter_map(|i| self.link_at(i))
            .filter(|link| link.path == path)
            .collect()
    }

    pub fn remove_line(&mut self, line: usize) -> Option<String> {
        (line < self.lines.len()).then(|| self.lines.remove(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FindLoc;

    fn results() -> FindResults {
        FindResults {
            request: FindRequest::new("foo", FindLoc::All),
            files: vec![
                FileResult {
                    path: PathBuf::from("/p/a.go"),
                    count: 2,
                    regions: vec![Region::on_line(0, 0, 3), Region::on_line(4, 2, 5)],
                    lines: vec!["foo()".to_string(), "  foo := 1".to_string()],
                    buffer: None,
                },
                FileResult {
                    path: PathBuf::from("/p/b.go"),
                    count: 1,
                    regions: vec![Region::on_line(1, 0, 3)],
                    lines: vec!["foo".to_string()],
                    buffer: None,
                },
            ],
        }
    }

    #[test]
    fn render_layout() {
        let view = results().render();
        assert_eq!(
            view.lines(),
            &[
                "[2] /p/a.go".to_string(),
                "find:///p/a.go#R1N2L1C1-L1C4\tfoo()".to_string(),
                "find:///p/a.go#R1N2L5C3-L5C6\tfoo := 1".to_string(),
                "[1] /p/b.go".to_string(),
                "find:///p/b.go#R4N1L2C1-L2C4\tfoo".to_string(),
            ]
        );
    }

    #[test]
    fn navigate_links() {
        let mut view = results().render();
        assert!(view.link_at(0).is_none());
        assert_eq!(view.next_link(0), Some(1));
        assert_eq!(view.next_link(3), Some(4));
        assert_eq!(view.links_for(Path::new("/p/a.go")).len(), 2);

        view.remove_line(1);
        let next = view.link_at(1).unwrap();
        assert_eq!(next.region, Region::on_line(4, 2, 5));
        assert_eq!(view.links_for(Path::new("/p/a.go")).len(), 1);
        assert_eq!(view.remove_line(10), None);
    }
}
