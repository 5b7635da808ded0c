use crate::command::Flow;
use crate::env::Environment;
use crate::job::JobTable;
use crate::parser::RedirectKind;
use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{AccessFlags, ForkResult, Pid, access, dup2, execve, fork};
use std::borrow::Cow;
use std::ffi::CString;
use std::fs::File;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An opened redirection target waiting to be wired into a child.
#[derive(Debug)]
pub struct Redirection {
    pub kind: RedirectKind,
    pub file: File,
}

impl Redirection {
    /// Open `target` the way `kind` requires.
    pub fn open(kind: RedirectKind, target: &str) -> Result<Self> {
        let file = kind
            .open(Path::new(target))
            .with_context(|| format!("{}: cannot open", target))?;
        Ok(Self { kind, file })
    }

    /// Replace the child's standard streams with the file, then close the original.
    fn install(self) -> nix::Result<()> {
        let fd = self.file.as_raw_fd();
        for &target in self.kind.targets() {
            dup2(fd, target)?;
        }
        Ok(())
    }
}

/// How a single external command is started.
#[derive(Debug, Default)]
pub struct LaunchOptions {
    pub redirect: Option<Redirection>,
    pub background: bool,
}

/// Everything `execve` needs, built before forking so the child only wires
/// descriptors and replaces itself.
#[derive(Debug)]
struct Program {
    /// `None` when the name resolved to nothing runnable.
    path: Option<CString>,
    args: Vec<CString>,
    envp: Vec<CString>,
}

impl Program {
    fn resolve(argv: &[String], env: &Environment) -> Result<Self> {
        let search_paths = env.search_paths().unwrap_or_default();
        let path = find_command_path(&search_paths, Path::new(&argv[0]))
            .map(|path| CString::new(path.as_os_str().as_bytes()))
            .transpose()
            .context("command path contains a NUL byte")?;
        let args = argv
            .iter()
            .map(|arg| CString::new(arg.as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .context("argument contains a NUL byte")?;
        Ok(Self {
            path,
            args,
            envp: env.to_envp(),
        })
    }
}

/// Fork and execute `argv`, then either wait for it or register it as a job.
///
/// Built-ins never reach this function; `argv` must not be empty.
pub fn launch(
    argv: &[String],
    options: LaunchOptions,
    env: &Environment,
    jobs: &mut JobTable,
) -> Result<Flow> {
    let Some(name) = argv.first() else {
        return Ok(Flow::Continue);
    };
    let program = Program::resolve(argv, env)?;
    debug!(command = %name, path = ?program.path, "resolved");
    // The child inherits unflushed buffers; write them out once, here.
    io::stdout().flush()?;

    match unsafe { fork() }.context("fork failed")? {
        ForkResult::Child => exec_child(&program, options.redirect),
        ForkResult::Parent { child } => {
            debug!(pid = %child, command = %name, background = options.background, "forked");
            drop(options.redirect);
            if options.background {
                let command = argv.join(" ");
                let index = jobs.add(child, command.clone());
                println!("[{}] {} {}", index + 1, child, command);
                return Ok(Flow::Continue);
            }
            wait_for(child)?;
            Ok(Flow::Continue)
        }
    }
}

/// Block until `pid` exits or is killed by a signal; stops are ignored.
pub fn wait_for(pid: Pid) -> Result<()> {
    loop {
        match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::Exited(_, code)) => {
                debug!(%pid, code, "child exited");
                return Ok(());
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                debug!(%pid, ?signal, "child killed by signal");
                return Ok(());
            }
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(e) => return Err(e).with_context(|| format!("waiting for {} failed", pid)),
        }
    }
}

fn exec_child(program: &Program, redirect: Option<Redirection>) -> ! {
    let mut stderr = io::stderr();
    if let Some(redirect) = redirect {
        if let Err(e) = redirect.install() {
            let _ = writeln!(stderr, "rush: redirection failed: {}", e);
            unsafe { libc::_exit(1) }
        }
    }
    let not_found = match &program.path {
        Some(path) => matches!(execve(path, &program.args, &program.envp), Err(Errno::ENOENT)),
        None => true,
    };
    if not_found {
        let name = program.args[0].to_string_lossy();
        let _ = writeln!(stderr, "rush: command not found: {}", name);
    }
    unsafe { libc::_exit(1) }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is an executable file.
/// - Relative with multiple components (e.g., `bin/sh`) or `./foo`: returns it if it is
///   an executable file.
/// - Single path component (no separators): search each directory in `search_paths`
///   and return the first executable match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered via PATH lookup.
pub fn find_command_path<'a>(search_paths: &[PathBuf], path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        // Empty path -> not found
        (None, None) => None,
        (Some(x), None) if !path.starts_with(".") => {
            find_in_path(search_paths, x.as_os_str()).map(Cow::Owned)
        }
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &[PathBuf], cmd: &std::ffi::OsStr) -> Option<PathBuf> {
    search_paths
        .iter()
        .map(|dir| dir.join(cmd))
        .find(|candidate| find_by_path(candidate).is_some())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    let executable = path.is_file() && access(path, AccessFlags::X_OK).is_ok();
    if executable { Some(path) } else { None }
}
