use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

/// Languages recognised from file extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Language {
    Go,
    Rust,
    Python,
    C,
    Cpp,
    JavaScript,
    TypeScript,
    Markdown,
    Toml,
    Json,
    Yaml,
    Shell,
    Html,
    Css,
    Java,
}

impl Language {
    pub const ALL: [Language; 15] = [
        Language::Go,
        Language::Rust,
        Language::Python,
        Language::C,
        Language::Cpp,
        Language::JavaScript,
        Language::TypeScript,
        Language::Markdown,
        Language::Toml,
        Language::Json,
        Language::Yaml,
        Language::Shell,
        Language::Html,
        Language::Css,
        Language::Java,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Language::Go => "Go",
            Language::Rust => "Rust",
            Language::Python => "Python",
            Language::C => "C",
            Language::Cpp => "C++",
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
            Language::Markdown => "Markdown",
            Language::Toml => "TOML",
            Language::Json => "JSON",
            Language::Yaml => "YAML",
            Language::Shell => "Shell",
            Language::Html => "HTML",
            Language::Css => "CSS",
            Language::Java => "Java",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let lang = match ext.to_ascii_lowercase().as_str() {
            "go" => Language::Go,
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "c" | "h" => Language::C,
            "cc" | "cpp" | "cxx" | "hh" | "hpp" | "hxx" => Language::Cpp,
            "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
            "ts" | "tsx" => Language::TypeScript,
            "md" | "markdown" => Language::Markdown,
            "toml" => Language::Toml,
            "json" => Language::Json,
            "yml" | "yaml" => Language::Yaml,
            "sh" | "bash" | "zsh" => Language::Shell,
            "html" | "htm" => Language::Html,
            "css" => Language::Css,
            "java" => Language::Java,
            _ => return None,
        };
        Some(lang)
    }

    /// Whether files in this language are compiled or run, as opposed to
    /// documentation and data
    pub fn is_source(&self) -> bool {
        !matches!(
            self,
            Language::Markdown | Language::Toml | Language::Json | Language::Yaml
        )
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Language::ALL
            .into_iter()
            .find(|lang| lang.name().eq_ignore_ascii_case(s))
            .or_else(|| match s.to_ascii_lowercase().as_str() {
                "cpp" => Some(Language::Cpp),
                "js" => Some(Language::JavaScript),
                "ts" => Some(Language::TypeScript),
                "bash" | "sh" => Some(Language::Shell),
                _ => None,
            })
            .ok_or_else(|| format!("unknown language {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_from_path() {
        assert_eq!(Language::from_path(Path::new("/a/b/main.go")), Some(Language::Go));
        assert_eq!(Language::from_path(Path::new("lib.RS")), Some(Language::Rust));
        assert_eq!(Language::from_path(Path::new("x.hpp")), Some(Language::Cpp));
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
        assert_eq!(Language::from_path(Path::new("data.bin")), None);
    }

    #[test]
    fn data_files_are_not_source() {
        assert!(Language::Go.is_source());
        assert!(Language::Shell.is_source());
        assert!(!Language::Markdown.is_source());
        assert!(!Language::Json.is_source());
    }

    #[test]
    fn names_round_trip() {
        for lang in Language::ALL {
            assert_eq!(lang.name().parse::<Language>(), Ok(lang));
        }
        assert_eq!("go".parse::<Language>(), Ok(Language::Go));
        assert_eq!("cpp".parse::<Language>(), Ok(Language::Cpp));
        assert!("Cobol".parse::<Language>().is_err());
    }
}
