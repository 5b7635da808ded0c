//! Terminal mode switching and the signals that end the shell.

use anyhow::{Context, Result};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::sys::termios::{LocalFlags, SetArg, SpecialCharacterIndices, Termios, tcgetattr, tcsetattr};
use std::fs::File;
use std::io::{self, IsTerminal};
use std::os::fd::AsFd;
use std::sync::OnceLock;
use tracing::debug;

/// Attributes the terminal had before the shell first touched it.
static ORIGINAL: OnceLock<libc::termios> = OnceLock::new();

/// Raw mode for as long as the guard lives: no line buffering, no echo.
///
/// Signals stay enabled, so Ctrl-C still reaches the shell. Input typed while
/// the terminal was cooked is kept and read as the start of the next line.
#[derive(Debug)]
pub struct RawMode<F: AsFd> {
    fd: F,
    saved: Option<Termios>,
}

impl RawMode<io::Stdin> {
    /// Raw mode on standard input; a no-op guard when it is not a terminal.
    pub fn enable() -> Result<Self> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Ok(Self {
                fd: stdin,
                saved: None,
            });
        }
        let raw = Self::enable_on(stdin)?;
        if let Some(saved) = &raw.saved {
            let _ = ORIGINAL.set(saved.clone().into());
        }
        Ok(raw)
    }
}

impl<F: AsFd> RawMode<F> {
    /// Raw mode on the terminal behind `fd`.
    pub fn enable_on(fd: F) -> Result<Self> {
        let saved = tcgetattr(fd.as_fd()).context("cannot read terminal attributes")?;

        let mut raw = saved.clone();
        raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        tcsetattr(fd.as_fd(), SetArg::TCSANOW, &raw).context("cannot enter raw mode")?;

        Ok(Self {
            fd,
            saved: Some(saved),
        })
    }
}

impl<F: AsFd> Drop for RawMode<F> {
    fn drop(&mut self) {
        if let Some(saved) = &self.saved {
            if let Err(e) = tcsetattr(self.fd.as_fd(), SetArg::TCSANOW, saved) {
                debug!(error = %e, "failed to restore terminal");
            }
        }
    }
}

/// An unbuffered reader over a duplicate of `fd`.
///
/// Every `read` is one system call, so bytes after the end of a line stay in
/// the kernel for whatever program runs next.
pub fn unbuffered_reader(fd: impl AsFd) -> io::Result<File> {
    Ok(File::from(fd.as_fd().try_clone_to_owned()?))
}

extern "C" fn on_signal(_: libc::c_int) {
    if let Some(original) = ORIGINAL.get() {
        unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, original) };
    }
    unsafe { libc::_exit(0) }
}

/// Make SIGINT, SIGTERM and SIGQUIT end the shell with status 0, putting the
/// terminal back the way it was found.
pub fn exit_on_signals() -> Result<()> {
    if let Ok(termios) = tcgetattr(io::stdin().as_fd()) {
        let _ = ORIGINAL.set(termios.into());
    }
    let action = SigAction::new(SigHandler::Handler(on_signal), SaFlags::empty(), SigSet::empty());
    for signal in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGQUIT] {
        unsafe { sigaction(signal, &action) }
            .with_context(|| format!("cannot install handler for {}", signal))?;
    }
    Ok(())
}
