use std::{borrow::Cow, path::Path};

/// Expand a leading `~` so breakpoint paths compare equal to adapter paths
pub fn normalise_path(path: &Path) -> Cow<'_, Path> {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return Cow::Owned(home.join(stripped));
        }
        tracing::warn!("cannot determine home directory, using path as-is");
    }
    Cow::Borrowed(path)
}
