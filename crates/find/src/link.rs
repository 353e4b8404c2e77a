use std::{fmt, path::PathBuf, str::FromStr};

use documents::{Pos, Region};

use crate::FindError;

const SCHEME: &str = "find://";

/// Link from a line of the results buffer back to one match.
///
/// Formatted as `find:///<path>#R<start>N<count>L<line>C<col>-L<line>C<col>`
/// where `R` is the 0-based results line of the file's first match, `N` the
/// number of matches in the file and `L`/`C` are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindLink {
    pub path: PathBuf,
    pub results_line: usize,
    pub count: usize,
    /// 0-based match region
    pub region: Region,
}

impl fmt::Display for FindLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SCHEME}{}#R{}N{}L{}C{}-L{}C{}",
            self.path.display(),
            self.results_line,
            self.count,
            self.region.start.line + 1,
            self.region.start.col + 1,
            self.region.end.line + 1,
            self.region.end.col + 1,
        )
    }
}

/// Split `s` at the first non-digit, parsing the leading digits
fn number(s: &str) -> Option<(usize, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let n = s[..end].parse().ok()?;
    Some((n, &s[end..]))
}

fn tagged(s: &str, tag: char) -> Option<(usize, &str)> {
    number(s.strip_prefix(tag)?)
}

/// Parse a 1-based `L<line>C<col>` pair into a position
fn position(s: &str) -> Option<(Pos, &str)> {
    let (line, rest) = tagged(s, 'L')?;
    let (col, rest) = tagged(rest, 'C')?;
    Some((Pos::new(line.checked_sub(1)?, col.checked_sub(1)?), rest))
}

impl FromStr for FindLink {
    type Err = FindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || FindError::BadLink(s.to_string());
        let rest = s.strip_prefix(SCHEME).ok_or_else(bad)?;
        let (path, fragment) = rest.rsplit_once('#').ok_or_else(bad)?;
        if path.is_empty() {
            return Err(bad());
        }

        let parse = || {
            let (results_line, rest) = tagged(fragment, 'R')?;
            let (count, rest) = tagged(rest, 'N')?;
            let (start, rest) = position(rest)?;
            let (end, rest) = position(rest.strip_prefix('-')?)?;
            rest.is_empty().then_some(FindLink {
                path: PathBuf::from(path),
                results_line,
                count,
                region: Region::new(start, end),
            })
        };
        parse().ok_or_else(bad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format() {
        let link = FindLink {
            path: PathBuf::from("/p/src/main.go"),
            results_line: 3,
            count: 2,
            region: Region::on_line(9, 4, 7),
        };
        assert_eq!(link.to_string(), "find:///p/src/main.go#R3N2L10C5-L10C8");
    }

    #[test]
    fn parse() {
        let link: FindLink = "find:///p/a#b.go#R0N7L1C1-L2C3".parse().unwrap();
        assert_eq!(link.path, PathBuf::from("/p/a#b.go"));
        assert_eq!(link.results_line, 0);
        assert_eq!(link.count, 7);
        assert_eq!(link.region, Region::new(Pos::new(0, 0), Pos::new(1, 2)));
    }

    #[test]
    fn rejects_malformed() {
        for bad in [
            "file:///p/a.go#R0N1L1C1-L1C2",
            "find:///p/a.go",
            "find://#R0N1L1C1-L1C2",
            "find:///p/a.go#R0N1L0C1-L1C2",
            "find:///p/a.go#R0N1L1C1",
            "find:///p/a.go#R0N1L1C1-L1C2x",
        ] {
            assert!(bad.parse::<FindLink>().is_err(), "{bad}");
        }
    }
}
