use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;

/// Escape text for inclusion in sink markup
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// Converts one line of command output into markup
pub trait OutputFilter: Send + Sync {
    fn markup(&self, line: &str) -> String;
}

/// Rewrites `path:line[:col]` references into `file:///` links
#[derive(Debug, Clone)]
pub struct LinkFilter {
    base: PathBuf,
}

static FILE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<path>[\w.\-/]*[\w\-]\.\w+):(?P<line>\d+)(?::(?P<col>\d+))?")
        .expect("file reference pattern is valid")
});

impl LinkFilter {
    /// Relative paths in the output are resolved against `base`
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}

impl OutputFilter for LinkFilter {
    fn markup(&self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut last = 0;
        for caps in FILE_REF.captures_iter(line) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&escape_markup(&line[last..whole.start()]));
            let path = self.resolve(&caps["path"]);
            let col = caps.name("col").map_or("1", |c| c.as_str());
            out.push_str(&format!(
                r#"<a href="file:///{}#L{}C{}">{}</a>"#,
                escape_markup(path.display().to_string().trim_start_matches('/')),
                &caps["line"],
                col,
                escape_markup(whole.as_str()),
            ));
            last = whole.end();
        }
        out.push_str(&escape_markup(&line[last..]));
        out
    }
}
