use regex::{Regex, RegexBuilder};

use crate::region::{Pos, Region};

/// Compile a literal pattern, optionally ignoring case
pub fn literal_regex(pattern: &str, ignore_case: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&regex::escape(pattern))
        .case_insensitive(ignore_case)
        .build()
}

/// Byte offsets of the start of every line
fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

fn pos_at(text: &str, starts: &[usize], offset: usize) -> Pos {
    let line = match starts.binary_search(&offset) {
        Ok(line) => line,
        Err(next) => next - 1,
    };
    let col = text[starts[line]..offset].chars().count();
    Pos::new(line, col)
}

/// Every non-empty match of `re` in `text` as line/column regions
pub fn find_regions(text: &str, re: &Regex) -> Vec<Region> {
    let starts = line_starts(text);
    re.find_iter(text)
        .filter(|m| !m.is_empty())
        .map(|m| Region::new(pos_at(text, &starts, m.start()), pos_at(text, &starts, m.end())))
        .collect()
}

/// Byte offset of `pos` in `text`, if it lies inside it
pub fn offset_of(text: &str, pos: Pos) -> Option<usize> {
    let starts = line_starts(text);
    let start = *starts.get(pos.line)?;
    let line_end = text[start..]
        .find('\n')
        .map_or(text.len(), |i| start + i);
    let line = &text[start..line_end];
    if pos.col == line.chars().count() {
        return Some(line_end);
    }
    line.char_indices().nth(pos.col).map(|(i, _)| start + i)
}

/// Byte range covered by `region`
pub fn region_offsets(text: &str, region: Region) -> Option<(usize, usize)> {
    let start = offset_of(text, region.start)?;
    let end = offset_of(text, region.end)?;
    (start <= end).then_some((start, end))
}
