//! Psh binary: argument handling, logging setup and the interpreter loop.

use std::env;
use std::process::{self, ExitStatus};

use docopt::Docopt;
use serde_derive::Deserialize;

use psh_rs::shell::{Shell, ShellConfig};
use psh_rs::PshExitStatusExt;

const USAGE: &str = "
psh.

Usage:
    psh [<file>]
    psh -c <command>
    psh (-h | --help)
    psh --version

Options:
    -h --help    Show this screen.
    --version    Show version.
    -c           If the -c option is present, then commands are read from the first non-option
                     argument command_string.
";

#[derive(Debug, Deserialize)]
struct Args {
    arg_file: Option<String>,
    arg_command: Option<String>,
    flag_c: bool,
    flag_version: bool,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    if args.flag_version {
        println!("psh version {}", env!("CARGO_PKG_VERSION"));
        process::exit(0);
    }

    if let Err(e) = init_logger() {
        eprintln!("psh: failed to initialize logging: {}", e);
    }

    let config = if args.flag_c || args.arg_file.is_some() {
        ShellConfig::noninteractive()
    } else {
        ShellConfig::interactive()
    };
    let mut shell = Shell::new(config);

    if args.flag_c {
        let command = args.arg_command.unwrap_or_default();
        if let Err(e) = shell.execute_command_string(&command) {
            eprintln!("psh: {}", e);
            shell.exit(Some(ExitStatus::from_failure()));
        }
    } else if let Some(ref file) = args.arg_file {
        if let Err(e) = shell.execute_commands_from_file(file) {
            eprintln!("psh: {}", e);
            shell.exit(Some(ExitStatus::from_failure()));
        }
    } else {
        shell.execute_from_stdin();
    }

    shell.exit(None);
}

fn init_logger() -> Result<(), fern::InitError> {
    let log_path = dirs::home_dir()
        .unwrap_or_else(env::temp_dir)
        .join(".psh.log");

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(fern::log_file(log_path)?)
        .apply()?;

    Ok(())
}
