use std::collections::BTreeSet;

use documents::Language;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::FindError;

/// Which files a find looks at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindLoc {
    /// Files in every open directory of the file tree
    #[default]
    Open,
    /// Recursive walk of the project root
    All,
    /// The active file only
    File,
    /// Files next to the active file
    Dir,
    /// Like `Open`, without the files at the top of the tree
    NotTop,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindRequest {
    pub pattern: String,
    pub replace: String,
    pub ignore_case: bool,
    pub regex: bool,
    pub loc: FindLoc,
    /// Empty means every language
    pub langs: BTreeSet<Language>,
}

impl FindRequest {
    pub fn new(pattern: impl Into<String>, loc: FindLoc) -> Self {
        Self {
            pattern: pattern.into(),
            loc,
            ..Default::default()
        }
    }

    /// Compile the pattern, escaping it unless this is a regex find
    pub fn compile(&self) -> Result<Regex, FindError> {
        let source = if self.regex {
            self.pattern.clone()
        } else {
            regex::escape(&self.pattern)
        };
        RegexBuilder::new(&source)
            .case_insensitive(self.ignore_case)
            .build()
            .map_err(|source| FindError::InvalidRegex {
                pattern: self.pattern.clone(),
                source,
            })
    }

    pub fn wants_language(&self, lang: Option<Language>) -> bool {
        self.langs.is_empty() || lang.is_some_and(|l| self.langs.contains(&l))
    }
}

/// Project level settings that shape every find
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindConfig {
    /// Files larger than this many bytes are skipped
    pub big_file_size: u64,
    /// Extension of project files, which are never searched
    pub project_ext: String,
}

impl Default for FindConfig {
    fn default() -> Self {
        Self {
            big_file_size: 10_000_000,
            project_ext: ".workbench".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_patterns_are_escaped() {
        let req = FindRequest::new("a+b", FindLoc::All);
        let re = req.compile().unwrap();
        assert!(re.is_match("x a+b y"));
        assert!(!re.is_match("aab"));
    }

    #[test]
    fn ignore_case_applies_to_regex() {
        let req = FindRequest {
            regex: true,
            ignore_case: true,
            ..FindRequest::new("fo+", FindLoc::All)
        };
        assert!(req.compile().unwrap().is_match("FOO"));
    }

    #[test]
    fn invalid_regex() {
        let req = FindRequest {
            regex: true,
            ..FindRequest::new("(unclosed", FindLoc::All)
        };
        assert!(matches!(req.compile(), Err(FindError::InvalidRegex { .. })));
    }

    #[test]
    fn language_filter() {
        let mut req = FindRequest::new("x", FindLoc::All);
        assert!(req.wants_language(None));
        req.langs.insert(Language::Go);
        assert!(req.wants_language(Some(Language::Go)));
        assert!(!req.wants_language(Some(Language::Rust)));
        assert!(!req.wants_language(None));
    }
}
