//! Psh - Shell Module
//!
//! The Shell reads command lines, hands the parsed form to the executor and
//! keeps the interpreter-level state: the background job table and the exit
//! status of the last command.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{self, ExitStatus};

use atty::Stream;
use failure::ResultExt;
use log::info;

use crate::errors::{ErrorKind, Result};
use crate::execute_command::{execute_command_line, COMMAND_NOT_FOUND_EXIT_STATUS};
use crate::jobs::{JobTable, MAX_JOBS};
use crate::parse::CommandLine;
use crate::util::PshExitStatusExt;

const SYNTAX_ERROR_EXIT_STATUS: i32 = 2;
const EXIT_BUILTIN: &str = "exit";

/// Psh Shell
pub struct Shell {
    jobs: JobTable,
    /// Exit status of last command executed.
    last_exit_status: ExitStatus,
    config: ShellConfig,
    is_interactive: bool,
}

impl Shell {
    /// Constructs a new Shell to manage running jobs.
    pub fn new(config: ShellConfig) -> Shell {
        let shell = Shell {
            jobs: JobTable::with_capacity(config.job_capacity),
            last_exit_status: ExitStatus::from_success(),
            config,
            is_interactive: atty::is(Stream::Stdin),
        };

        info!("psh started up");
        shell
    }

    /// Custom prompt to output to the user.
    /// Returns `None` when end of file is reached.
    pub fn prompt(&mut self) -> Result<Option<String>> {
        if self.is_interactive {
            print!("$ ");
            io::stdout().flush().context(ErrorKind::Io)?;
        }

        let mut input = String::new();
        let bytes_read = io::stdin().read_line(&mut input).context(ErrorKind::Io)?;
        if bytes_read == 0 {
            return Ok(None);
        }

        Ok(Some(input))
    }

    /// Runs a job from a command string.
    pub fn execute_command_string(&mut self, input: &str) -> Result<()> {
        let line = match CommandLine::parse(input) {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(()),
            Err(e) => {
                if let ErrorKind::Syntax(ref near) = *e.kind() {
                    eprintln!("psh: syntax error near: {}", near);
                    self.last_exit_status = ExitStatus::from_status(SYNTAX_ERROR_EXIT_STATUS);
                    return Ok(());
                }

                return Err(e);
            }
        };

        if let Some(status) = exit_request(&line) {
            self.exit(status);
        }

        match execute_command_line(&mut self.jobs, &line) {
            Ok(status) => {
                self.last_exit_status = status;
                Ok(())
            }
            Err(e) => match *e.kind() {
                ErrorKind::CommandNotFound(ref command) => {
                    eprintln!("psh: {}: command not found", command);
                    self.last_exit_status =
                        ExitStatus::from_status(COMMAND_NOT_FOUND_EXIT_STATUS);
                    Ok(())
                }
                ErrorKind::Redirect(_) | ErrorKind::EmptyPipelineStage(_) => {
                    eprintln!("psh: {}", e);
                    self.last_exit_status = ExitStatus::from_failure();
                    Ok(())
                }
                _ => Err(e),
            },
        }
    }

    /// Runs a psh script from a file.
    pub fn execute_commands_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let mut f = File::open(path).context(ErrorKind::Io)?;
        let mut buffer = String::new();
        f.read_to_string(&mut buffer)
            .with_context(|_| ErrorKind::Io)?;

        for line in buffer.split('\n') {
            self.execute_command_string(line)?
        }

        Ok(())
    }

    /// Runs jobs from stdin until EOF is received.
    pub fn execute_from_stdin(&mut self) {
        loop {
            // Free finished background jobs before reading the next line.
            self.jobs.reap();

            let input = match self.prompt() {
                Ok(Some(line)) => line.trim().to_owned(),
                Ok(None) => break,
                e => {
                    log_if_err!(e, "prompt");
                    continue;
                }
            };

            let temp_result = self.execute_command_string(&input);
            log_if_err!(temp_result, "execute_command_string");
        }
    }

    /// Returns `true` if the shell has background jobs.
    pub fn has_background_jobs(&self) -> bool {
        self.jobs.has_jobs()
    }

    /// Exit the shell.
    ///
    /// Valid exit codes are between 0 and 255. Like bash and its
    /// descendents, it automatically converts exit codes to a u8 such that
    /// positive n becomes n % 256 and negative n becomes (256 + n) % 256.
    ///
    /// Exit the shell with a status of n. If n is None, then the exit status
    /// is that of the last command executed.
    pub fn exit(&mut self, n: Option<ExitStatus>) -> ! {
        if self.config.display_messages {
            println!("exit");
        }

        let code = match n {
            Some(n) => n.code().unwrap_or(0),
            None => self.last_exit_status.code().unwrap_or(0),
        };
        let code_like_u8 = if code < 0 {
            (256 + code) % 256
        } else {
            code % 256
        };

        info!("psh has shut down");
        process::exit(code_like_u8);
    }
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:?}last status: {:?}",
            self.jobs, self.last_exit_status
        )
    }
}

/// Recognizes the `exit` builtin: `exit [n]`.
///
/// Returns the requested exit status, or `Some(None)` for a bare `exit`.
fn exit_request(line: &CommandLine) -> Option<Option<ExitStatus>> {
    if line.stages.len() != 1 || line.stages[0].program != EXIT_BUILTIN {
        return None;
    }

    let status = line.stages[0]
        .args
        .first()
        .and_then(|arg| arg.parse::<i32>().ok())
        .map(ExitStatus::from_status);
    Some(status)
}

/// Policy object to control a Shell's behavior
#[derive(Debug, Copy, Clone)]
pub struct ShellConfig {
    /// Determines if some messages (e.g. "exit") should be displayed.
    display_messages: bool,

    /// Number of slots in the background job table.
    job_capacity: usize,
}

impl ShellConfig {
    /// Creates an interactive shell configuration.
    ///
    /// # Complete List
    /// - Some additional messages are displayed
    pub fn interactive() -> ShellConfig {
        ShellConfig {
            display_messages: true,
            job_capacity: MAX_JOBS,
        }
    }

    /// Creates a noninteractive shell configuration.
    ///
    /// # Complete List
    /// - Fewer messages are displayed
    pub fn noninteractive() -> ShellConfig {
        Default::default()
    }
}

impl Default for ShellConfig {
    fn default() -> ShellConfig {
        ShellConfig {
            display_messages: false,
            job_capacity: MAX_JOBS,
        }
    }
}
