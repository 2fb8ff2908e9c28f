//! Error module. See the [failure](https://crates.io/crates/failure) crate for details.

use std::fmt;
use std::io;
use std::result;

use failure::{Backtrace, Context, Fail};

/// Convenient alias for the crate's `Result` type.
pub type Result<T> = result::Result<T, Error>;

/// Error type for all psh operations.
#[derive(Debug)]
pub struct Error {
    ctx: Context<ErrorKind>,
}

impl Error {
    /// The kind of error that occurred.
    pub fn kind(&self) -> &ErrorKind {
        self.ctx.get_context()
    }

    pub(crate) fn syntax<T: AsRef<str>>(line: T) -> Error {
        Error::from(ErrorKind::Syntax(line.as_ref().to_string()))
    }

    pub(crate) fn command_not_found<T: AsRef<str>>(command: T) -> Error {
        Error::from(ErrorKind::CommandNotFound(command.as_ref().to_string()))
    }

    pub(crate) fn redirect<T: AsRef<str>>(path: T, cause: &io::Error) -> Error {
        Error::from(ErrorKind::Redirect(format!("{}: {}", path.as_ref(), cause)))
    }

    pub(crate) fn empty_pipeline_stage(stage: usize) -> Error {
        Error::from(ErrorKind::EmptyPipelineStage(stage))
    }

    pub(crate) fn job_table_full() -> Error {
        Error::from(ErrorKind::JobTableFull)
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.ctx.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.ctx.backtrace()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.ctx.fmt(f)
    }
}

/// The kind of an error that can occur while parsing or executing a command
/// line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The input line could not be parsed.
    Syntax(String),
    /// The requested program does not exist or is not executable.
    CommandNotFound(String),
    /// A redirection file could not be opened; carries the offending path
    /// and the underlying system error text.
    Redirect(String),
    /// A pipeline stage had no program name.
    EmptyPipelineStage(usize),
    /// The background job table has no free slot.
    JobTableFull,
    /// An I/O error occurred.
    Io,
    /// A nix syscall wrapper failed.
    Nix,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ErrorKind::Syntax(ref line) => write!(f, "syntax error: '{}'", line),
            ErrorKind::CommandNotFound(ref command) => {
                write!(f, "{}: command not found", command)
            }
            ErrorKind::Redirect(ref message) => write!(f, "{}", message),
            ErrorKind::EmptyPipelineStage(stage) => {
                write!(f, "empty command in pipeline at stage {}", stage)
            }
            ErrorKind::JobTableFull => write!(f, "jobs: job table full"),
            ErrorKind::Io => write!(f, "I/O error occurred"),
            ErrorKind::Nix => write!(f, "Nix error occurred"),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::from(Context::new(kind))
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(ctx: Context<ErrorKind>) -> Error {
        Error { ctx }
    }
}
