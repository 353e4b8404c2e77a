//! Open file buffers, their registry and autosave sidecars
mod autosave;
mod buffer;
mod lang;
mod open_docs;
mod region;
mod search;

use std::path::PathBuf;

pub use autosave::{
    AutosaveChoice, AutosavePrompt, Reconciled, autosave_path, is_autosave_name,
    reconcile_on_open, remove_autosave, write_autosave,
};
pub use buffer::{Buffer, MemoryBuffer, match_case};
pub use lang::Language;
pub use open_docs::{OpenDocs, SaveAllPrompt, SaveChoice};
pub use region::{Pos, Region, TextEdit};
pub use search::{find_regions, literal_regex, offset_of, region_offsets};

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("reading {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("region {0} is outside the buffer")]
    InvalidRegion(Region),

    #[error("buffer {} is no longer open", .0.display())]
    Detached(PathBuf),
}
