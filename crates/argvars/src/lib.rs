//! Argument variables for command templates
//!
//! Command programs, arguments and working directories are templates which
//! reference variables as `{Name}`. A backslash before the opening brace
//! keeps the braces literally, and identifiers outside braces are never
//! touched.
mod bind;
mod values;
mod vars;

pub use bind::{bind_with, template_vars};
pub use values::{ArgValues, EditorContext, ProjectVars};
pub use vars::{ARG_VARS, ArgVar, ArgVarKind, PROMPT_SLOTS, lookup, prompt_var_name};

/// Errors raised while preparing a template for dispatch
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BindError {
    /// The template references prompt slots that have no value yet
    #[error("template needs user input for prompt slots {slots:?}")]
    MissingPrompts { slots: Vec<usize> },

    /// Prompt slots are numbered 1 to 3
    #[error("invalid prompt slot {0}")]
    InvalidPromptSlot(usize),
}
