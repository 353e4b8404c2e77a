use std::fmt;

/// A 0-based line and character column within a buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

impl Pos {
    pub const fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Half-open range of positions, `start` inclusive and `end` exclusive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Region {
    pub start: Pos,
    pub end: Pos,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A completed replacement: `region` held the old text, the new text
/// runs from `region.start` to `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEdit {
    pub region: Region,
    pub end: Pos,
}

impl Region {
    pub const fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }

    /// Region on a single line
    pub const fn on_line(line: usize, start_col: usize, end_col: usize) -> Self {
        Self {
            start: Pos::new(line, start_col),
            end: Pos::new(line, end_col),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Where this region lies after `edit` was applied to the buffer.
    ///
    /// Returns `None` when the edit touched the region, which makes it stale.
    pub fn adjusted(&self, edit: &TextEdit) -> Option<Region> {
        let old = edit.region;
        if *self == old || self.overlaps(&old) {
            return None;
        }
        if self.end <= old.start {
            return Some(*self);
        }
        Some(Region {
            start: shift(self.start, old.end, edit.end),
            end: shift(self.end, old.end, edit.end),
        })
    }
}

/// Move a position lying after `old_end` so it keeps its distance to `new_end`
fn shift(pos: Pos, old_end: Pos, new_end: Pos) -> Pos {
    if pos.line == old_end.line {
        Pos::new(new_end.line, new_end.col + (pos.col - old_end.col))
    } else {
        Pos::new(pos.line + new_end.line - old_end.line, pos.col)
    }
}
