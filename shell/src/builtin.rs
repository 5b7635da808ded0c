use crate::command::{FatalError, Flow};
use crate::env::Environment;
use crate::interpreter::Interpreter;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use regex::Regex;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process: they change the working directory, the exported variables or the
/// shell's own state, none of which would survive in a forked child.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "history" or "cd".
    fn name() -> &'static str;

    /// Executes the command, writing any report to `stdout`.
    fn execute(self, stdout: &mut dyn Write, shell: &mut Interpreter) -> Result<Flow>;
}

/// Every built-in, as a plain tag that can be matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Cd,
    Help,
    Exit,
    History,
    Export,
    Source,
    Jump,
    Bg,
}

impl Builtin {
    pub const ALL: [Builtin; 8] = [
        Builtin::Cd,
        Builtin::Help,
        Builtin::Exit,
        Builtin::History,
        Builtin::Export,
        Builtin::Source,
        Builtin::Jump,
        Builtin::Bg,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Cd => Cd::name(),
            Builtin::Help => Help::name(),
            Builtin::Exit => Exit::name(),
            Builtin::History => History::name(),
            Builtin::Export => Export::name(),
            Builtin::Source => Source::name(),
            Builtin::Jump => Jump::name(),
            Builtin::Bg => Bg::name(),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    /// Parse `args` for this built-in and run it in the shell process.
    pub fn run(self, args: &[String], stdout: &mut dyn Write, shell: &mut Interpreter) -> Result<Flow> {
        match self {
            Builtin::Cd => invoke::<Cd>(args, stdout, shell),
            Builtin::Help => invoke::<Help>(args, stdout, shell),
            Builtin::Exit => invoke::<Exit>(args, stdout, shell),
            Builtin::History => invoke::<History>(args, stdout, shell),
            Builtin::Export => invoke::<Export>(args, stdout, shell),
            Builtin::Source => invoke::<Source>(args, stdout, shell),
            Builtin::Jump => invoke::<Jump>(args, stdout, shell),
            Builtin::Bg => invoke::<Bg>(args, stdout, shell),
        }
    }
}

fn invoke<T: BuiltinCommand>(
    args: &[String],
    stdout: &mut dyn Write,
    shell: &mut Interpreter,
) -> Result<Flow> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match T::from_args(&[T::name()], &args) {
        Ok(cmd) => cmd.execute(stdout, shell),
        // `--help` lands here with a successful status.
        Err(EarlyExit { output, status }) => match status {
            Ok(()) => {
                stdout.write_all(output.as_bytes())?;
                Ok(Flow::Continue)
            }
            Err(()) => Err(anyhow::anyhow!("{}: {}", T::name(), output.trim_end())),
        },
    }
}

/// Change the working directory of both the shell process and `env`.
fn change_dir(env: &mut Environment, target: &Path) -> Result<PathBuf> {
    let new_dir = if target.is_absolute() {
        target.to_path_buf()
    } else {
        env.current_dir.join(target)
    };

    let canonical = fs::canonicalize(&new_dir)
        .with_context(|| format!("cd: {}", target.display()))?;

    env::set_current_dir(&canonical)
        .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
    env.current_dir = canonical.clone();
    Ok(canonical)
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; a leading `~` stands for $HOME. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, shell: &mut Interpreter) -> Result<Flow> {
        let env = &mut shell.env;
        let target = match self.target.as_deref() {
            Some(t) if !t.is_empty() => env.expand_tilde(t),
            _ => env
                .home()
                .ok_or_else(|| FatalError::new("HOME environment variable is missing"))?,
        };
        change_dir(env, &target)?;
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs)]
/// Show the built-in commands.
pub struct Help {}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn execute(self, stdout: &mut dyn Write, _shell: &mut Interpreter) -> Result<Flow> {
        writeln!(stdout, "rush v{}", env!("CARGO_PKG_VERSION"))?;
        writeln!(stdout, "Built in commands:")?;
        for builtin in Builtin::ALL {
            writeln!(stdout, "  {}", builtin.name())?;
        }
        writeln!(stdout, "Use 'man' to read manual of programs")?;
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs)]
/// Exit shell process
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored; the shell always exits with status 0
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, _shell: &mut Interpreter) -> Result<Flow> {
        Ok(Flow::Stop)
    }
}

#[derive(FromArgs)]
/// Print every command in the history file, each distinct line once.
pub struct History {}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, stdout: &mut dyn Write, shell: &mut Interpreter) -> Result<Flow> {
        for line in shell.history.read_all(true)? {
            writeln!(stdout, "{}", line)?;
        }
        Ok(Flow::Continue)
    }
}

static ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^=]+)=(.+)$").expect("assignment pattern is valid"));

#[derive(FromArgs)]
/// Set environment variables for commands started afterwards.
pub struct Export {
    #[argh(positional, greedy)]
    /// assignments in the form VARIABLE=VALUE
    pub assignments: Vec<String>,
}

impl BuiltinCommand for Export {
    fn name() -> &'static str {
        "export"
    }

    fn execute(self, _stdout: &mut dyn Write, shell: &mut Interpreter) -> Result<Flow> {
        for assignment in &self.assignments {
            let Some(caps) = ASSIGNMENT.captures(assignment) else {
                return Err(anyhow::anyhow!(
                    "syntax error when setting environment variable '{}'\nUse \"export VARIABLE=VALUE\"",
                    assignment
                ));
            };
            shell.env.set_var(&caps[1], &caps[2]);
        }
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs)]
/// Run every line of a file as if it had been typed at the prompt.
pub struct Source {
    #[argh(positional)]
    /// file with one command per line
    pub path: String,
}

impl BuiltinCommand for Source {
    fn name() -> &'static str {
        "source"
    }

    fn execute(self, _stdout: &mut dyn Write, shell: &mut Interpreter) -> Result<Flow> {
        let path = shell.env.expand_tilde(&self.path);
        let script = fs::read_to_string(&path)
            .with_context(|| format!("no such file or directory '{}'", self.path))?;
        let mut flow = Flow::Continue;
        for line in script.lines().filter(|line| !line.trim().is_empty()) {
            flow = shell.run_line(line)?;
        }
        Ok(flow)
    }
}

/// Names accepted by `j`, with the directory each one jumps to.
pub const SHORTCUTS: &[(&str, &str)] = &[
    ("home", "~"),
    ("dl", "~/Downloads"),
    ("docs", "~/Documents"),
    ("pics", "~/Pictures"),
    ("cfg", "~/.config"),
    ("tmp", "/tmp"),
];

#[derive(FromArgs)]
/// Jump to a directory by its shortcut name.
pub struct Jump {
    #[argh(positional)]
    /// one of: home, dl, docs, pics, cfg, tmp
    pub shortcut: String,
}

impl BuiltinCommand for Jump {
    fn name() -> &'static str {
        "j"
    }

    fn execute(self, stdout: &mut dyn Write, shell: &mut Interpreter) -> Result<Flow> {
        let Some(&(_, dir)) = SHORTCUTS.iter().find(|(name, _)| *name == self.shortcut) else {
            return Err(anyhow::anyhow!("j: unknown shortcut '{}'", self.shortcut));
        };
        let target = shell.env.expand_tilde(dir);
        let landed = change_dir(&mut shell.env, &target)?;
        writeln!(stdout, "jumped to {}", landed.display())?;
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs)]
/// Show the background job with the given number.
pub struct Bg {
    #[argh(positional)]
    /// job number as printed when the job was started, counting from 1
    pub index: usize,
}

impl BuiltinCommand for Bg {
    fn name() -> &'static str {
        "bg"
    }

    fn execute(self, stdout: &mut dyn Write, shell: &mut Interpreter) -> Result<Flow> {
        let job = self
            .index
            .checked_sub(1)
            .and_then(|index| shell.jobs.get(index))
            .ok_or_else(|| anyhow::anyhow!("bg: {}: no such job", self.index))?;
        let state = if job.running { "running" } else { "done" };
        writeln!(stdout, "[{}] {} {} ({})", self.index, job.pid, job.command, state)?;
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::is_fatal;
    use crate::history::{FileHistory, HistoryStore};
    use crate::testing::lock_current_dir;
    use nix::unistd::Pid;
    use std::env as stdenv;

    fn shell() -> (tempfile::TempDir, Interpreter) {
        let dir = tempfile::tempdir().unwrap();
        let history = FileHistory::open(dir.path().join(".rush_history")).unwrap();
        let shell = Interpreter::new(Environment::new(), Box::new(history));
        (dir, shell)
    }

    fn run(shell: &mut Interpreter, builtin: Builtin, args: &[&str]) -> (Result<Flow>, String) {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let mut out = Vec::new();
        let res = builtin.run(&args, &mut out, shell);
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn names_round_trip() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_name(builtin.name()), Some(builtin));
        }
        assert_eq!(Builtin::from_name("j"), Some(Builtin::Jump));
        assert_eq!(Builtin::from_name("pwd"), None);
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = lock_current_dir();
        let (_dir, mut shell) = shell();
        let temp = tempfile::tempdir().unwrap();
        let canonical_temp = fs::canonicalize(temp.path()).unwrap();
        let orig = stdenv::current_dir().unwrap();

        let (res, _) = run(&mut shell, Builtin::Cd, &[canonical_temp.to_str().unwrap()]);
        let new_cwd = stdenv::current_dir().unwrap();
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert_eq!(res.unwrap(), Flow::Continue);
        assert_eq!(fs::canonicalize(new_cwd).unwrap(), canonical_temp);
        assert_eq!(shell.env.current_dir, canonical_temp);
    }

    #[test]
    fn test_cd_to_home_when_none() {
        let _lock = lock_current_dir();
        let (_dir, mut shell) = shell();
        let temp = tempfile::tempdir().unwrap();
        let canonical_temp = fs::canonicalize(temp.path()).unwrap();
        let orig = stdenv::current_dir().unwrap();
        shell.env.set_var("HOME", canonical_temp.to_string_lossy().to_string());

        let (res, _) = run(&mut shell, Builtin::Cd, &[]);
        let new_cwd = stdenv::current_dir().unwrap();
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert!(res.is_ok());
        assert_eq!(fs::canonicalize(new_cwd).unwrap(), canonical_temp);
    }

    #[test]
    fn test_cd_expands_tilde() {
        let _lock = lock_current_dir();
        let (_dir, mut shell) = shell();
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("proj")).unwrap();
        let canonical_temp = fs::canonicalize(temp.path()).unwrap();
        let orig = stdenv::current_dir().unwrap();
        shell.env.set_var("HOME", canonical_temp.to_string_lossy().to_string());

        let (res, _) = run(&mut shell, Builtin::Cd, &["~/proj"]);
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert!(res.is_ok());
        assert_eq!(shell.env.current_dir, canonical_temp.join("proj"));
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let _lock = lock_current_dir();
        let (_dir, mut shell) = shell();
        let orig = stdenv::current_dir().unwrap();

        let name = format!("nonexistent_dir_for_rush_test_{}", std::process::id());
        let (res, _) = run(&mut shell, Builtin::Cd, &[&name]);

        let err = res.unwrap_err();
        assert!(!is_fatal(&err));
        assert_eq!(stdenv::current_dir().unwrap(), orig);
    }

    #[test]
    fn test_help_lists_builtins() {
        let (_dir, mut shell) = shell();
        let (res, out) = run(&mut shell, Builtin::Help, &[]);
        assert_eq!(res.unwrap(), Flow::Continue);
        assert!(out.starts_with("rush v"));
        for builtin in Builtin::ALL {
            assert!(out.contains(&format!("  {}\n", builtin.name())));
        }
    }

    #[test]
    fn test_builtin_usage_is_printed_for_help_flag() {
        let (_dir, mut shell) = shell();
        let (res, out) = run(&mut shell, Builtin::Export, &["--help"]);
        assert_eq!(res.unwrap(), Flow::Continue);
        assert!(out.contains("Usage: export"));
    }

    #[test]
    fn test_exit_stops_loop() {
        let (_dir, mut shell) = shell();
        assert_eq!(run(&mut shell, Builtin::Exit, &[]).0.unwrap(), Flow::Stop);
        assert_eq!(run(&mut shell, Builtin::Exit, &["3"]).0.unwrap(), Flow::Stop);
    }

    #[test]
    fn test_history_prints_deduplicated_lines() {
        let (_dir, mut shell) = shell();
        for line in ["ls", "pwd", "ls", "echo hi"] {
            shell.history.append(line).unwrap();
        }
        let (res, out) = run(&mut shell, Builtin::History, &[]);
        assert!(res.is_ok());
        assert_eq!(out, "ls\npwd\necho hi\n");
    }

    #[test]
    fn test_export_sets_variables() {
        let (_dir, mut shell) = shell();
        let (res, _) = run(&mut shell, Builtin::Export, &["RUSH_A=1", "RUSH_B=x=y"]);
        assert!(res.is_ok());
        assert_eq!(shell.env.get_var("RUSH_A"), Some("1".to_string()));
        assert_eq!(shell.env.get_var("RUSH_B"), Some("x=y".to_string()));
    }

    #[test]
    fn test_export_malformed_aborts_remaining() {
        let (_dir, mut shell) = shell();
        let (res, _) = run(
            &mut shell,
            Builtin::Export,
            &["RUSH_FIRST=1", "RUSH_BROKEN", "RUSH_LATER=2"],
        );
        let err = res.unwrap_err();
        assert!(err.to_string().contains("syntax error"));
        assert_eq!(shell.env.get_var("RUSH_FIRST"), Some("1".to_string()));
        assert_eq!(shell.env.get_var("RUSH_LATER"), None);

        assert!(run(&mut shell, Builtin::Export, &["=value"]).0.is_err());
        assert!(run(&mut shell, Builtin::Export, &["RUSH_EMPTY="]).0.is_err());
    }

    #[test]
    fn test_source_runs_each_line() {
        let (dir, mut shell) = shell();
        let script = dir.path().join("script.rush");
        fs::write(&script, "export RUSH_SOURCED=yes\n\nexport RUSH_SECOND=ok\n").unwrap();

        let (res, _) = run(&mut shell, Builtin::Source, &[script.to_str().unwrap()]);
        assert_eq!(res.unwrap(), Flow::Continue);
        assert_eq!(shell.env.get_var("RUSH_SOURCED"), Some("yes".to_string()));
        assert_eq!(shell.env.get_var("RUSH_SECOND"), Some("ok".to_string()));
    }

    #[test]
    fn test_source_propagates_last_signal() {
        let (dir, mut shell) = shell();
        let script = dir.path().join("script.rush");
        fs::write(&script, "export RUSH_X=1\nexit\n").unwrap();

        let (res, _) = run(&mut shell, Builtin::Source, &[script.to_str().unwrap()]);
        assert_eq!(res.unwrap(), Flow::Stop);
    }

    #[test]
    fn test_source_missing_file_errors() {
        let (dir, mut shell) = shell();
        let missing = dir.path().join("missing");
        assert!(run(&mut shell, Builtin::Source, &[missing.to_str().unwrap()]).0.is_err());
        assert!(run(&mut shell, Builtin::Source, &[]).0.is_err());
    }

    #[test]
    fn test_jump_to_known_shortcut() {
        let _lock = lock_current_dir();
        let (_dir, mut shell) = shell();
        let orig = stdenv::current_dir().unwrap();

        let (res, out) = run(&mut shell, Builtin::Jump, &["tmp"]);
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert!(res.is_ok());
        let tmp = fs::canonicalize("/tmp").unwrap();
        assert_eq!(out, format!("jumped to {}\n", tmp.display()));
        assert_eq!(shell.env.current_dir, tmp);
    }

    #[test]
    fn test_jump_unknown_shortcut_errors() {
        let (_dir, mut shell) = shell();
        let (res, _) = run(&mut shell, Builtin::Jump, &["nowhere"]);
        assert!(res.unwrap_err().to_string().contains("unknown shortcut"));
    }

    #[test]
    fn test_bg_reports_job_by_one_based_index() {
        let (_dir, mut shell) = shell();
        shell.jobs.add(Pid::from_raw(4242), "sleep 100");
        shell.jobs.add(Pid::from_raw(4343), "yes");

        let (res, out) = run(&mut shell, Builtin::Bg, &["2"]);
        assert!(res.is_ok());
        assert_eq!(out, "[2] 4343 yes (running)\n");

        assert!(run(&mut shell, Builtin::Bg, &["3"]).0.is_err());
        assert!(run(&mut shell, Builtin::Bg, &["0"]).0.is_err());
        assert!(run(&mut shell, Builtin::Bg, &["one"]).0.is_err());
    }
}
