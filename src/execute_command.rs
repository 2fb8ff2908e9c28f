//! Psh command execution
//!
//! Launches the child processes for a parsed [`CommandLine`], wiring their
//! standard streams through redirection files and inter-stage pipes. Every
//! descriptor lives in an owning handle (`File`, `Command`, `Child`), so all
//! close calls of the classic fork/exec formulation become scope exits here;
//! ownership still transfers to a stage exactly when it is spawned.
//!
//! [`CommandLine`]: ../parse/struct.CommandLine.html

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::process::{Child, Command, ExitStatus, Stdio};

use failure::{Fail, ResultExt};
use log::debug;

use crate::errors::{Error, ErrorKind, Result};
use crate::jobs::JobTable;
use crate::parse::{CommandLine, Stage};
use crate::util::PshExitStatusExt;

/// Exit status reported when a program cannot be found or executed.
pub const COMMAND_NOT_FOUND_EXIT_STATUS: i32 = 127;

const JOBS_BUILTIN: &str = "jobs";

/// Effective standard input for a spawned stage.
#[derive(Debug)]
enum Input {
    Inherit,
    File(File),
}

/// Effective standard output for a spawned stage.
#[derive(Debug)]
enum Output {
    Inherit,
    File(File),
}

impl Input {
    /// Opens the input redirection read-only, if one is present.
    fn new(redirect: &Option<String>) -> Result<Input> {
        match redirect {
            Some(path) => File::open(path)
                .map(Input::File)
                .map_err(|e| Error::redirect(path, &e)),
            None => Ok(Input::Inherit),
        }
    }
}

impl Output {
    /// Opens the output redirection, if one is present: write-only, created
    /// if absent, truncated if present, mode 0644.
    fn new(redirect: &Option<String>) -> Result<Output> {
        match redirect {
            Some(path) => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o644)
                .open(path)
                .map(Output::File)
                .map_err(|e| Error::redirect(path, &e)),
            None => Ok(Output::Inherit),
        }
    }
}

impl From<Input> for Stdio {
    fn from(input: Input) -> Self {
        match input {
            Input::Inherit => Stdio::inherit(),
            Input::File(file) => file.into(),
        }
    }
}

impl From<Output> for Stdio {
    fn from(output: Output) -> Self {
        match output {
            Output::Inherit => Stdio::inherit(),
            Output::File(file) => file.into(),
        }
    }
}

/// Executes a parsed command line: one simple command or an N-stage
/// pipeline, foreground or background.
///
/// Every invocation begins with a non-blocking reap pass so that finished
/// background jobs free their table slots before a new job may be
/// registered. Returns the exit status of a foreground command (the last
/// stage's, for a pipeline); background execution registers the spawned
/// processes and returns success immediately.
pub fn execute_command_line(jobs: &mut JobTable, line: &CommandLine) -> Result<ExitStatus> {
    jobs.reap();

    if line.stages.is_empty() {
        return Ok(ExitStatus::from_success());
    }
    validate_stages(&line.stages)?;

    if line.stages.len() == 1 {
        run_simple_command(jobs, line)
    } else {
        run_pipeline_command(jobs, line)
    }
}

/// Rejects stages with no program name before any descriptor is created or
/// process spawned.
fn validate_stages(stages: &[Stage]) -> Result<()> {
    match stages.iter().position(|stage| stage.program.is_empty()) {
        Some(index) => Err(Error::empty_pipeline_stage(index)),
        None => Ok(()),
    }
}

fn run_simple_command(jobs: &mut JobTable, line: &CommandLine) -> Result<ExitStatus> {
    let stage = &line.stages[0];
    if stage.program == JOBS_BUILTIN {
        jobs.list();
        return Ok(ExitStatus::from_success());
    }

    let stdin = Input::new(&line.infile)?;
    let stdout = Output::new(&line.outfile)?;

    let mut child = match spawn_stage(stage, stdin.into(), stdout.into()) {
        Ok(child) => child,
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::command_not_found(&stage.program));
        }
        Err(e) => return Err(e.context(ErrorKind::Io).into()),
    };

    if line.background {
        register_background_job(jobs, vec![child], &line.input);
        return Ok(ExitStatus::from_success());
    }

    let status = child.wait().context(ErrorKind::Io)?;
    Ok(status)
}

fn run_pipeline_command(jobs: &mut JobTable, line: &CommandLine) -> Result<ExitStatus> {
    let nstages = line.stages.len();

    // The full pipe chain exists before anything is spawned, then the
    // overall redirection endpoints.
    let mut pipes = Vec::with_capacity(nstages - 1);
    for _ in 1..nstages {
        pipes.push(create_pipe()?);
    }
    let input = Input::new(&line.infile)?;
    let output = Output::new(&line.outfile)?;

    // Stage i reads stdins[i] and writes stdouts[i]: the overall redirection
    // at the outer ends, adjacent pipe endpoints everywhere else.
    let mut stdins: Vec<Stdio> = Vec::with_capacity(nstages);
    let mut stdouts: Vec<Stdio> = Vec::with_capacity(nstages);
    stdins.push(input.into());
    for (read_end_pipe, write_end_pipe) in pipes {
        stdouts.push(write_end_pipe.into());
        stdins.push(read_end_pipe.into());
    }
    stdouts.push(output.into());

    let mut children: Vec<Child> = Vec::with_capacity(nstages);
    let mut last_stage_spawned = false;
    for ((stage, stdin), stdout) in line.stages.iter().zip(stdins).zip(stdouts) {
        match spawn_stage(stage, stdin, stdout) {
            Ok(child) => {
                children.push(child);
                last_stage_spawned = true;
            }
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
                // This stage's endpoints drop here, so its reader sees
                // end-of-stream and its writer EPIPE; sibling stages keep
                // running and are still waited on below.
                eprintln!("psh: {}: command not found", stage.program);
                last_stage_spawned = false;
            }
            Err(e) => {
                // Abort the whole pipeline: reap the stages already
                // running, release every remaining descriptor on return.
                for child in &mut children {
                    log_if_err!(child.wait(), "pipeline abort wait");
                }
                return Err(e.context(ErrorKind::Io).into());
            }
        }
    }

    if line.background {
        register_background_job(jobs, children, &line.input);
        return Ok(ExitStatus::from_success());
    }

    // Wait for every spawned stage, in spawn order.
    let mut status = ExitStatus::from_success();
    for child in &mut children {
        status = child.wait().context(ErrorKind::Io)?;
    }
    if !last_stage_spawned {
        // the final stage never ran
        status = ExitStatus::from_status(COMMAND_NOT_FOUND_EXIT_STATUS);
    }
    Ok(status)
}

/// Spawns one stage with the given endpoints. The `Command`, and with it the
/// parent's copies of the endpoints, is dropped on return; the stage holds
/// the duplicates on its standard streams from here on.
fn spawn_stage(stage: &Stage, stdin: Stdio, stdout: Stdio) -> io::Result<Child> {
    debug!("spawning '{}' with {} args", stage.program, stage.args.len());
    Command::new(&stage.program)
        .args(&stage.args)
        .stdin(stdin)
        .stdout(stdout)
        .spawn()
}

/// Registers spawned children as one background job. A full table is
/// reported but not fatal: the processes keep running untracked.
fn register_background_job(jobs: &mut JobTable, children: Vec<Child>, input: &str) {
    if children.is_empty() {
        return;
    }

    if let Err(e) = jobs.add(children, input) {
        eprintln!("psh: {}", e);
    }
}

/// Wraps `unistd::pipe2()` to return RAII structs instead of raw, owning
/// file descriptors. Returns (`read_end_pipe`, `write_end_pipe`).
///
/// The descriptors are close-on-exec: a spawned stage keeps only the ends
/// duplicated onto its standard streams, so unassigned pipe ends never leak
/// into unrelated processes and a downstream reader always observes
/// end-of-stream once its writers are gone.
fn create_pipe() -> Result<(File, File)> {
    use std::os::unix::io::FromRawFd;

    use nix::fcntl::OFlag;
    use nix::unistd;

    // IMPORTANT: immediately pass the RawFds returned by unistd::pipe2()
    // into RAII structs (File). If the function returns before they are
    // moved into RAII structs, the fds could be leaked.
    // It is safe to call from_raw_fd here because read_end_pipe and
    // write_end_pipe are the owners of the file descriptors, meaning no one
    // else will close them out from under us.
    let (read_end_pipe, write_end_pipe) =
        unistd::pipe2(OFlag::O_CLOEXEC).context(ErrorKind::Nix)?;
    unsafe {
        Ok((
            File::from_raw_fd(read_end_pipe),
            File::from_raw_fd(write_end_pipe),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;
    use std::time::Duration;

    use tempdir::TempDir;

    use super::*;
    use crate::parse::{CommandLineBuilder, StageBuilder};

    fn line(input: &str) -> CommandLine {
        CommandLine::parse(input).unwrap().unwrap()
    }

    fn reap_until_empty(jobs: &mut JobTable) {
        for _ in 0..500 {
            jobs.reap();
            if !jobs.has_jobs() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("background jobs were never reaped");
    }

    #[test]
    fn test_foreground_true_and_false() {
        let mut jobs = JobTable::with_capacity(4);

        let status = execute_command_line(&mut jobs, &line("true")).unwrap();
        assert!(status.success());

        let status = execute_command_line(&mut jobs, &line("false")).unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_empty_command_line_is_a_no_op() {
        let mut jobs = JobTable::with_capacity(4);
        let empty = CommandLineBuilder::new("").build();
        let status = execute_command_line(&mut jobs, &empty).unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_output_redirection_creates_file() {
        let temp_dir = TempDir::new("psh-test").unwrap();
        let out = temp_dir.path().join("out.txt");
        let mut jobs = JobTable::with_capacity(4);

        let input = format!("echo needle > {}", out.display());
        let status = execute_command_line(&mut jobs, &line(&input)).unwrap();

        assert!(status.success());
        assert_eq!(fs::read_to_string(&out).unwrap(), "needle\n");
    }

    #[test]
    fn test_output_redirection_truncates_prior_content() {
        let temp_dir = TempDir::new("psh-test").unwrap();
        let out = temp_dir.path().join("out.txt");
        fs::write(&out, "previous contents that are much longer than the output").unwrap();
        let mut jobs = JobTable::with_capacity(4);

        let input = format!("echo hi > {}", out.display());
        execute_command_line(&mut jobs, &line(&input)).unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), "hi\n");
    }

    #[test]
    fn test_input_redirection() {
        let temp_dir = TempDir::new("psh-test").unwrap();
        let infile = temp_dir.path().join("in.txt");
        let out = temp_dir.path().join("out.txt");
        fs::write(&infile, "needle\n").unwrap();
        let mut jobs = JobTable::with_capacity(4);

        let input = format!("cat < {} > {}", infile.display(), out.display());
        let status = execute_command_line(&mut jobs, &line(&input)).unwrap();

        assert!(status.success());
        assert_eq!(fs::read_to_string(&out).unwrap(), "needle\n");
    }

    #[test]
    fn test_missing_input_file_reports_path() {
        let mut jobs = JobTable::with_capacity(4);
        let err = execute_command_line(&mut jobs, &line("cat < /psh/no/such/file")).unwrap_err();

        match err.kind() {
            ErrorKind::Redirect(message) => assert!(message.contains("/psh/no/such/file")),
            kind => panic!("unexpected error kind: {:?}", kind),
        }
    }

    #[test]
    fn test_pipeline_copies_producer_output() {
        let temp_dir = TempDir::new("psh-test").unwrap();
        let out = temp_dir.path().join("out.txt");
        let mut jobs = JobTable::with_capacity(4);

        let input = format!("echo needle | cat > {}", out.display());
        let status = execute_command_line(&mut jobs, &line(&input)).unwrap();

        assert!(status.success());
        assert_eq!(fs::read_to_string(&out).unwrap(), "needle\n");
    }

    #[test]
    fn test_three_stage_pipeline() {
        let temp_dir = TempDir::new("psh-test").unwrap();
        let out = temp_dir.path().join("out.txt");
        let mut jobs = JobTable::with_capacity(4);

        let input = format!("echo needle | cat | cat > {}", out.display());
        let status = execute_command_line(&mut jobs, &line(&input)).unwrap();

        assert!(status.success());
        assert_eq!(fs::read_to_string(&out).unwrap(), "needle\n");
    }

    #[test]
    fn test_command_not_found_single() {
        let mut jobs = JobTable::with_capacity(4);
        let err = execute_command_line(&mut jobs, &line("psh-no-such-program")).unwrap_err();

        assert_eq!(
            *err.kind(),
            ErrorKind::CommandNotFound("psh-no-such-program".to_string())
        );
    }

    #[test]
    fn test_not_found_stage_leaves_siblings_running() {
        let temp_dir = TempDir::new("psh-test").unwrap();
        let out = temp_dir.path().join("out.txt");
        let mut jobs = JobTable::with_capacity(4);

        let input = format!("psh-no-such-program | cat > {}", out.display());
        let status = execute_command_line(&mut jobs, &line(&input)).unwrap();

        // the consumer ran against an empty stream and the redirection
        // target was still created
        assert!(status.success());
        assert_eq!(fs::read_to_string(&out).unwrap(), "");
    }

    #[test]
    fn test_not_found_final_stage_reports_not_found_status() {
        let mut jobs = JobTable::with_capacity(4);

        let status =
            execute_command_line(&mut jobs, &line("echo needle | psh-no-such-program")).unwrap();

        assert_eq!(status.code(), Some(COMMAND_NOT_FOUND_EXIT_STATUS));
    }

    #[test]
    fn test_empty_stage_rejects_whole_pipeline() {
        let mut jobs = JobTable::with_capacity(4);
        let mut builder = CommandLineBuilder::new("cat | |");
        builder
            .stage(StageBuilder::new("cat").build())
            .stage(StageBuilder::new("").build())
            .stage(StageBuilder::new("cat").build());

        let err = execute_command_line(&mut jobs, &builder.build()).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::EmptyPipelineStage(1));
    }

    #[test]
    fn test_background_command_is_tracked() {
        let mut jobs = JobTable::with_capacity(4);

        let status = execute_command_line(&mut jobs, &line("sleep 2 &")).unwrap();

        assert!(status.success());
        assert!(jobs.has_jobs());
    }

    #[test]
    fn test_background_pipeline_is_reaped_after_exit() {
        let mut jobs = JobTable::with_capacity(4);

        execute_command_line(&mut jobs, &line("echo hi | cat > /dev/null &")).unwrap();

        assert!(jobs.has_jobs());
        reap_until_empty(&mut jobs);
    }

    #[test]
    fn test_jobs_builtin_lists_without_spawning() {
        let mut jobs = JobTable::with_capacity(4);
        let status = execute_command_line(&mut jobs, &line("jobs")).unwrap();

        assert!(status.success());
        assert!(!jobs.has_jobs());
    }

    #[test]
    fn test_full_table_still_runs_background_request() {
        let mut jobs = JobTable::with_capacity(1);

        execute_command_line(&mut jobs, &line("sleep 2 &")).unwrap();
        // table is now full; the second request runs untracked
        let status = execute_command_line(&mut jobs, &line("sleep 2 &")).unwrap();

        assert!(status.success());
        assert!(jobs.has_jobs());
    }
}
