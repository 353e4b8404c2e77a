//! Error types for dispatching commands.

use std::io;

/// Errors that stop a command before any process is started.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// No command is registered under this label.
    #[error("unknown command {0}")]
    UnknownCommand(String),

    /// Labels have the form `Category: Name`.
    #[error("invalid command label '{0}', expected 'Category: Name'")]
    InvalidLabel(String),

    /// The user declined the confirmation for this command.
    #[error("{0} was not confirmed")]
    Confirm(String),

    /// The templates need prompt answers which were not given.
    #[error(transparent)]
    BadTemplate(#[from] argvars::BindError),

    /// The command references the active file but there is none.
    #[error("{0} needs an active editor view, but none is open")]
    NoActiveBuffer(String),

    /// The operating system refused to create the process.
    #[error("could not start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}
