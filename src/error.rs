//! Unified shell error model.
//!
//! Every user-visible failure in the shell (query parse/exec errors, macro
//! errors, render errors, ...) is a variant of [`ShellError`] so call sites can
//! propagate with `?` and `ShellLoop` has one place — [`ShellError::report`] —
//! that turns a failure into the exact on-screen string the operator sees.
//! Pure helpers that cannot themselves violate a user-facing contract (string
//! transforms in the painter, graph set algebra, ...) keep returning
//! `anyhow::Result` or plain values, matching the rest of the crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("error parsing query >> {0}")]
    Parse(String),

    #[error("error executing query >> {0}")]
    Exec(String),

    #[error("error executing statement {index}: {message}")]
    Statement { index: usize, message: String },

    #[error("{0}")]
    Macro(String),

    #[error("{0}")]
    Render(String),

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    FatalInit(String),
}

impl ShellError {
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        ShellError::Parse(msg.into())
    }
    pub fn exec<S: Into<String>>(msg: S) -> Self {
        ShellError::Exec(msg.into())
    }
    pub fn statement<S: Into<String>>(index: usize, msg: S) -> Self {
        ShellError::Statement { index, message: msg.into() }
    }
    pub fn macro_error<S: Into<String>>(msg: S) -> Self {
        ShellError::Macro(msg.into())
    }
    pub fn render<S: Into<String>>(msg: S) -> Self {
        ShellError::Render(msg.into())
    }
    pub fn io<S: Into<String>>(msg: S) -> Self {
        ShellError::Io(msg.into())
    }
    pub fn fatal_init<S: Into<String>>(msg: S) -> Self {
        ShellError::FatalInit(msg.into())
    }

    /// Whether this error is fatal and should terminate the process with a
    /// non-zero exit code rather than continue the loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShellError::FatalInit(_))
    }

    /// Render the exact line printed to the user, per the error table in the
    /// specification (`Error >> ...` prefix for everything but render/io
    /// warnings, which print without it).
    pub fn report(&self) -> String {
        match self {
            ShellError::Parse(_) | ShellError::Exec(_) | ShellError::Macro(_) => {
                format!("Error >> {}", self)
            }
            ShellError::Statement { .. } => format!("Error >> {}", self),
            ShellError::Render(msg) => format!("Error >> {}", msg),
            ShellError::Io(msg) => format!("Warning: {}", msg),
            ShellError::FatalInit(msg) => format!("Fatal: {}", msg),
        }
    }
}

pub type ShellResult<T> = Result<T, ShellError>;
