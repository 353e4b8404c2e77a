use std::path::Path;

/// How a source line is marked in its editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineColor {
    /// Disabled breakpoint
    Inactive,
    /// Enabled breakpoint
    Active,
    /// Breakpoint that was just hit
    Current,
    /// Program counter, not at a breakpoint
    CurrentPC,
}

/// Where the controller marks source lines. `line` is 0-based.
pub trait SourceDisplay: Send + Sync {
    /// Set or, with `None`, clear the color of a line
    fn set_line_color(&self, path: &Path, line: usize, color: Option<LineColor>);
}

/// Display that ignores every mark
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDisplay;

impl SourceDisplay for NoDisplay {
    fn set_line_color(&self, _path: &Path, _line: usize, _color: Option<LineColor>) {}
}
