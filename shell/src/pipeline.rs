//! Running `a | b | c`: one forked child per stage, wired with anonymous pipes.

use crate::command::Flow;
use crate::external::wait_for;
use crate::interpreter::Interpreter;
use anyhow::{Context, Result};
use nix::unistd::{ForkResult, Pid, dup2, fork, pipe};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use tracing::debug;

/// The pipe a stage writes into: `(read end, write end)`.
type Pipe = (OwnedFd, OwnedFd);

impl Interpreter {
    /// Run `stages` left to right, stage `i`'s output feeding stage `i + 1`.
    ///
    /// Every stage runs in its own child with the full single-command semantics,
    /// so built-ins and redirections work anywhere in the chain. The shell waits
    /// for all stages; individual exit statuses are not reported.
    pub fn execute_pipe(&mut self, stages: &[Vec<String>]) -> Result<Flow> {
        io::stdout().flush()?;

        let mut children: Vec<Pid> = Vec::with_capacity(stages.len());
        let mut upstream: Option<OwnedFd> = None;
        let mut spawned = Ok(());

        for (i, argv) in stages.iter().enumerate() {
            let is_last = i + 1 == stages.len();
            let downstream = if is_last {
                None
            } else {
                match pipe().context("pipe failed") {
                    Ok(fds) => Some(fds),
                    Err(e) => {
                        spawned = Err(e);
                        break;
                    }
                }
            };

            match unsafe { fork() }.context("fork failed") {
                Ok(ForkResult::Child) => self.run_stage(argv, upstream, downstream),
                Ok(ForkResult::Parent { child }) => {
                    debug!(pid = %child, stage = i, command = ?argv, "forked pipeline stage");
                    children.push(child);
                    // Our copy of the write end must go, or the reader never sees EOF.
                    upstream = downstream.map(|(read, _write)| read);
                }
                Err(e) => {
                    spawned = Err(e);
                    break;
                }
            }
        }
        drop(upstream);

        let mut waited = Ok(());
        for child in children {
            if let Err(e) = wait_for(child) {
                if waited.is_ok() {
                    waited = Err(e);
                }
            }
        }
        spawned.and(waited).map(|()| Flow::Continue)
    }

    fn run_stage(&mut self, argv: &[String], upstream: Option<OwnedFd>, downstream: Option<Pipe>) -> ! {
        let wired = wire_stage(upstream.as_ref(), downstream.as_ref().map(|(_, write)| write));
        // Close every inherited pipe end; the standard streams hold the ones in use.
        drop(upstream);
        drop(downstream);

        let code = match wired.and_then(|()| self.execute(argv)) {
            Ok(_) => 0,
            Err(e) => {
                let _ = writeln!(io::stderr(), "rush: {:#}", e);
                1
            }
        };
        let _ = io::stdout().flush();
        unsafe { libc::_exit(code) }
    }
}

fn wire_stage(upstream: Option<&OwnedFd>, downstream: Option<&OwnedFd>) -> Result<()> {
    if let Some(read) = upstream {
        dup2(read.as_raw_fd(), libc::STDIN_FILENO).context("dup2 stdin failed")?;
    }
    if let Some(write) = downstream {
        dup2(write.as_raw_fd(), libc::STDOUT_FILENO).context("dup2 stdout failed")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::command::Flow;
    use crate::env::Environment;
    use crate::history::FileHistory;
    use crate::interpreter::Interpreter;
    use std::fs;

    fn shell() -> (tempfile::TempDir, Interpreter) {
        let dir = tempfile::tempdir().unwrap();
        let history = FileHistory::open(dir.path().join(".rush_history")).unwrap();
        (dir, Interpreter::new(Environment::new(), Box::new(history)))
    }

    fn stage(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn two_stage_byte_count() {
        let (dir, mut sh) = shell();
        let out = dir.path().join("count");
        let stages = vec![
            stage(&["printf", "ab"]),
            stage(&["wc", "-c", ">", out.to_str().unwrap()]),
        ];
        assert_eq!(sh.execute_pipe(&stages).unwrap(), Flow::Continue);
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "2");
    }

    #[test]
    fn three_stages_preserve_order() {
        let (dir, mut sh) = shell();
        let out = dir.path().join("sorted");
        let stages = vec![
            stage(&["printf", "b\\na\\nc\\n"]),
            stage(&["sort"]),
            stage(&["head", "-n", "2", ">", out.to_str().unwrap()]),
        ];
        sh.execute_pipe(&stages).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "a\nb\n");
    }

    #[test]
    fn builtins_are_legal_inside_a_pipeline() {
        let (dir, mut sh) = shell();
        let out = dir.path().join("lines");
        let stages = vec![
            stage(&["help"]),
            stage(&["grep", "history", ">", out.to_str().unwrap()]),
        ];
        sh.execute_pipe(&stages).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "  history\n");
    }

    #[test]
    fn exit_inside_a_pipeline_does_not_stop_the_shell() {
        let (dir, mut sh) = shell();
        let out = dir.path().join("empty");
        let line = format!("exit | wc -c > {}", out.display());
        assert_eq!(sh.run_line(&line).unwrap(), Flow::Continue);
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "0");
    }

    #[test]
    fn run_line_routes_pipes_and_adds_color_flag() {
        let (dir, mut sh) = shell();
        let out = dir.path().join("grep");
        let line = format!("printf a\\nxb\\n | grep x > {}", out.display());
        sh.run_line(&line).unwrap();
        // `grep --color=auto` writes plain text when its output is a file.
        assert_eq!(fs::read_to_string(&out).unwrap(), "xb\n");
    }
}
