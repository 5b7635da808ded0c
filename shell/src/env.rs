use crate::command::FatalError;
use anyhow::Result;
use std::collections::HashMap;
use std::env as stdenv;
use std::ffi::CString;
use std::path::{Path, PathBuf};

/// File name of the command log kept under the config directory.
pub const HISTORY_FILE: &str = ".rush_history";

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: a map of environment variables that will be visible to executed commands.
/// - `current_dir`: the working directory for command execution.
///
/// `export` writes into `vars`; children receive exactly this map through `execve`,
/// so the shell never has to mutate its own process environment.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { vars, current_dir }
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// The `$HOME` directory, if any.
    pub fn home(&self) -> Option<PathBuf> {
        self.get_var("HOME").map(PathBuf::from)
    }

    /// Directories listed in `$PATH`, in search order.
    ///
    /// A missing `PATH` is a setup error the shell cannot recover from.
    pub fn search_paths(&self) -> Result<Vec<PathBuf>> {
        let raw = self
            .get_var("PATH")
            .ok_or_else(|| FatalError::new("PATH environment variable is missing"))?;
        Ok(split_search_paths(&raw))
    }

    /// Where the history file lives: `$XDG_CONFIG_HOME`, else `$HOME`.
    pub fn history_path(&self) -> Result<PathBuf> {
        let base = self
            .get_var("XDG_CONFIG_HOME")
            .or_else(|| self.get_var("HOME"))
            .ok_or_else(|| {
                FatalError::new("HOME AND XDG_CONFIG_HOME environment variable is missing")
            })?;
        Ok(Path::new(&base).join(HISTORY_FILE))
    }

    /// Expand a leading `~` to `$HOME`. Other paths are returned unchanged.
    pub fn expand_tilde(&self, path: &str) -> PathBuf {
        match (path.strip_prefix('~'), self.home()) {
            (Some(rest), Some(home)) => {
                let rest = rest.trim_start_matches('/');
                if rest.is_empty() { home } else { home.join(rest) }
            }
            _ => PathBuf::from(path),
        }
    }

    /// Render `vars` as `KEY=VALUE` strings for `execve`.
    pub fn to_envp(&self) -> Vec<CString> {
        self.vars
            .iter()
            .filter_map(|(k, v)| CString::new(format!("{}={}", k, v)).ok())
            .collect()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a `PATH`-style list on `:`, dropping empty entries.
pub fn split_search_paths(raw: &str) -> Vec<PathBuf> {
    raw.split(':')
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .collect()
}
