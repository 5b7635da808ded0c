use crate::builtin::Builtin;
use crate::external::find_command_path;
use std::fmt;
use std::path::{Path, PathBuf};

/// Whether the command loop should keep prompting after a command finished.
///
/// This is the only signal a command hands back to the loop; `exit` is the one
/// built-in that produces [`Flow::Stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// An error the shell cannot recover from, such as a missing `$HOME`.
///
/// Wrapped inside [`anyhow::Error`]; the command loop downcasts to this type to
/// decide between reporting a failed command and terminating the process.
#[derive(Debug)]
pub struct FatalError {
    message: String,
}

impl FatalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FatalError {}

/// True when `err` (or anything in its chain) is a [`FatalError`].
pub fn is_fatal(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<FatalError>())
}

/// Print a diagnostic in the shell's `rush: message` format.
pub fn report(err: &anyhow::Error) {
    eprintln!("rush: {:#}", err);
}

/// How a command name is carried out, decided once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Runs inside the shell process.
    Builtin(Builtin),
    /// Forked and executed; the name is resolved against `PATH` in the child.
    External(String),
}

impl Resolved {
    pub fn of(name: &str) -> Self {
        match Builtin::from_name(name) {
            Some(builtin) => Resolved::Builtin(builtin),
            None => Resolved::External(name.to_string()),
        }
    }
}

/// Whether `name` is one of the built-in commands.
pub fn is_builtin(name: &str) -> bool {
    Builtin::from_name(name).is_some()
}

/// Whether `name` would run: a built-in, or an executable file in one of `paths`.
///
/// Only used to pick a highlight color, so lookup failures simply mean `false`.
pub fn resolves(name: &str, paths: &[PathBuf]) -> bool {
    if name.is_empty() {
        return false;
    }
    if is_builtin(name) {
        return true;
    }
    find_command_path(paths, Path::new(name)).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_recognized() {
        for name in ["cd", "help", "exit", "history", "export", "source", "j", "bg"] {
            assert!(is_builtin(name), "{name} should be a builtin");
        }
        assert!(!is_builtin("frobnicate"));
        assert!(!is_builtin("CD"));
    }

    #[test]
    fn frobnicate_is_not_builtin_even_if_on_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frobnicate"), "").unwrap();
        assert!(!is_builtin("frobnicate"));
    }

    #[test]
    #[cfg(unix)]
    fn resolves_finds_executables_and_builtins() {
        let paths = vec![PathBuf::from("/does/not/exist"), PathBuf::from("/bin")];
        assert!(resolves("sh", &paths));
        assert!(resolves("cd", &[]));
        assert!(!resolves("definitely_not_a_command_4711", &paths));
        assert!(!resolves("", &paths));
    }

    #[test]
    #[cfg(unix)]
    fn resolves_ignores_non_executable_files() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain");
        let script = dir.path().join("script");
        std::fs::write(&plain, "").unwrap();
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let paths = vec![dir.path().to_path_buf()];
        assert!(!resolves("plain", &paths));
        assert!(resolves("script", &paths));
    }

    #[test]
    fn resolved_is_exactly_one_variant() {
        assert_eq!(Resolved::of("cd"), Resolved::Builtin(Builtin::Cd));
        assert_eq!(Resolved::of("ls"), Resolved::External("ls".to_string()));
    }

    #[test]
    fn fatal_errors_survive_context() {
        use anyhow::Context;
        let err: anyhow::Result<()> = Err(FatalError::new("boom").into());
        let err = err.context("while doing things").unwrap_err();
        assert!(is_fatal(&err));
        assert!(!is_fatal(&anyhow::anyhow!("plain")));
    }
}
