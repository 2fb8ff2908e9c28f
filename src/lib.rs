//! Psh - Pipe Shell
//!
//! A small line-oriented command interpreter. The heart of the crate is the
//! command-execution core: [`execute_command`] launches the child processes
//! for a parsed command line (one simple command or an N-stage pipeline,
//! with optional file redirection), wires their standard streams, and either
//! waits for them or hands them to the background [`jobs`] registry.

#![deny(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]

#[macro_use]
mod macros;

pub mod errors;
pub mod execute_command;
pub mod jobs;
pub mod parse;
pub mod shell;
mod util;

pub use crate::util::PshExitStatusExt;
