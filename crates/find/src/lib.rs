//! Find and replace across the files of a project
mod filter;
mod link;
mod replace;
mod request;
mod results;
mod scan;
mod tree;

pub use filter::{SkipReason, is_binary, skip_reason};
pub use link::FindLink;
pub use replace::Replacer;
pub use request::{FindConfig, FindLoc, FindRequest};
pub use results::{FileResult, FindResults, ResultsView};
pub use scan::{FindScope, find};
pub use tree::FileNode;

#[derive(Debug, thiserror::Error)]
pub enum FindError {
    #[error("invalid regular expression `{pattern}`")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no active file to search")]
    NoActiveFile,

    #[error("find was cancelled")]
    Cancelled,

    #[error("invalid find link `{0}`")]
    BadLink(String),

    #[error(transparent)]
    Document(#[from] documents::DocumentError),
}
