use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// A command started with a trailing `&`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub pid: Pid,
    pub command: String,
    pub running: bool,
}

/// Background jobs in launch order; a job's index is its position, starting at 0.
///
/// Entries are never removed, so an index stays valid for the whole session.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly launched job and return its index.
    pub fn add(&mut self, pid: Pid, command: impl Into<String>) -> usize {
        let command = command.into();
        debug!(%pid, %command, index = self.jobs.len(), "registered background job");
        self.jobs.push(Job {
            pid,
            command,
            running: true,
        });
        self.jobs.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Job> {
        self.jobs.get(index)
    }

    /// Collect finished background children without blocking.
    ///
    /// Exited jobs keep their slot and only lose the running flag.
    pub fn reap(&mut self) {
        for job in self.jobs.iter_mut().filter(|job| job.running) {
            match waitpid(job.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => {
                    debug!(pid = %job.pid, command = %job.command, "background job finished");
                    job.running = false;
                }
                Ok(_) => {}
                Err(nix::errno::Errno::ECHILD) => job.running = false,
                Err(e) => warn!(pid = %job.pid, error = %e, "failed to poll background job"),
            }
        }
    }
}
