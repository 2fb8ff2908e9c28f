//! Background job registry
//!
//! A fixed-capacity table of background jobs. The executor registers every
//! background command or pipeline here; slots are reclaimed by a
//! non-blocking reap pass and reused first-fit.

use std::fmt;
use std::process::Child;

use log::warn;

use crate::errors::{Error, Result};

/// Default number of slots in a [`JobTable`].
pub const MAX_JOBS: usize = 64;

/// Longest command-line text copied into a job entry.
const MAX_CMDLINE_LEN: usize = 256;

/// A background job: every child process of one command line, plus the text
/// that launched it.
///
/// A pipeline registers all of its stages in a single entry and stays active
/// until every stage has terminated; the first stage's pid is kept as the
/// representative id for listings.
struct JobEntry {
    pid: u32,
    children: Vec<Child>,
    cmdline: String,
}

impl JobEntry {
    /// Non-blocking check whether every child has terminated.
    fn has_finished(&mut self) -> bool {
        self.children.iter_mut().all(|child| match child.try_wait() {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                warn!("try_wait failed for pid {}: {}", child.id(), e);
                // a child we cannot wait on will never report completion
                true
            }
        })
    }
}

/// Fixed-capacity table of background jobs.
///
/// Slot indices are stable until the occupying job is reaped; freed slots
/// are reused first-fit by [`JobTable::add`]. The table never grows.
pub struct JobTable {
    slots: Vec<Option<JobEntry>>,
}

impl JobTable {
    /// Creates an empty table with the default capacity ([`MAX_JOBS`]).
    pub fn new() -> JobTable {
        JobTable::with_capacity(MAX_JOBS)
    }

    /// Creates an empty table with room for `capacity` jobs.
    pub fn with_capacity(capacity: usize) -> JobTable {
        JobTable {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    /// The fixed number of slots in this table.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if any slot holds a job not yet reaped.
    pub fn has_jobs(&self) -> bool {
        self.slots.iter().any(Option::is_some)
    }

    /// Registers `children` as one background job in the first free slot and
    /// returns the slot index.
    ///
    /// The command text is copied with a bounded length. If no slot is free
    /// the job is not tracked and [`ErrorKind::JobTableFull`] is returned;
    /// the caller decides whether that is fatal.
    ///
    /// `children` must be non-empty.
    ///
    /// [`ErrorKind::JobTableFull`]: ../errors/enum.ErrorKind.html
    pub fn add(&mut self, children: Vec<Child>, cmdline: &str) -> Result<usize> {
        assert!(!children.is_empty());

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(Error::job_table_full)?;

        let pid = children[0].id();
        println!("[{}] {}", index, pid);
        self.slots[index] = Some(JobEntry {
            pid,
            children,
            cmdline: bounded_cmdline(cmdline),
        });
        Ok(index)
    }

    /// Non-blocking reap pass: frees the slot of every job whose processes
    /// have all terminated. Safe to call arbitrarily often.
    pub fn reap(&mut self) {
        for slot in &mut self.slots {
            let finished = match slot.as_mut() {
                Some(entry) => entry.has_finished(),
                None => false,
            };
            if finished {
                *slot = None;
            }
        }
    }

    /// Reaps, then prints one line per still-running job.
    pub fn list(&mut self) {
        self.reap();

        let mut any = false;
        for entry in self.slots.iter().flatten() {
            any = true;
            let cmdline = if entry.cmdline.is_empty() {
                "(unknown)"
            } else {
                &entry.cmdline
            };
            println!("[{}] Running\t{}", entry.pid, cmdline);
        }
        if !any {
            println!("(no background jobs)");
        }
    }
}

impl Default for JobTable {
    fn default() -> JobTable {
        JobTable::new()
    }
}

impl fmt::Debug for JobTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let active = self.slots.iter().flatten().count();
        writeln!(f, "{}/{} jobs", active, self.slots.len())?;
        for entry in self.slots.iter().flatten() {
            write!(f, "{:?}", entry)?;
        }

        Ok(())
    }
}

impl fmt::Debug for JobEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "command: {}\tpid: {}\tprocesses: {}",
            self.cmdline,
            self.pid,
            self.children.len()
        )
    }
}

/// Copies `input`, truncated to [`MAX_CMDLINE_LEN`] bytes on a char boundary.
fn bounded_cmdline(input: &str) -> String {
    if input.len() <= MAX_CMDLINE_LEN {
        return input.to_string();
    }

    let mut end = MAX_CMDLINE_LEN;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    input[..end].to_string()
}
