use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::RawFd;
use std::path::Path;

/// Kind of redirection
///
/// Defines which standard streams are rewired and how the target file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `<`: standard input reads from the file.
    Input,
    /// `>`: standard output truncates and writes the file.
    Output,
    /// `>>`: standard output appends to the file.
    Append,
    /// `2>`: standard error truncates and writes the file.
    Stderr,
    /// `>&`: both standard output and standard error truncate and write the file.
    Both,
}

impl RedirectKind {
    /// Descriptors of the child that get replaced by the opened file.
    pub fn targets(self) -> &'static [RawFd] {
        match self {
            RedirectKind::Input => &[libc::STDIN_FILENO],
            RedirectKind::Output | RedirectKind::Append => &[libc::STDOUT_FILENO],
            RedirectKind::Stderr => &[libc::STDERR_FILENO],
            RedirectKind::Both => &[libc::STDOUT_FILENO, libc::STDERR_FILENO],
        }
    }

    /// Open `path` with the mode this redirection needs.
    pub fn open(self, path: &Path) -> io::Result<File> {
        let mut opts = OpenOptions::new();
        match self {
            RedirectKind::Input => opts.read(true),
            RedirectKind::Append => opts.append(true).create(true),
            RedirectKind::Output | RedirectKind::Stderr | RedirectKind::Both => {
                opts.write(true).create(true).truncate(true)
            }
        };
        opts.mode(0o644).open(path)
    }
}

/// A control token recognized verbatim inside an argument vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `&`: run the preceding words in the background.
    Background,
    Redirect(RedirectKind),
}

impl Operator {
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "&" => Operator::Background,
            ">" => Operator::Redirect(RedirectKind::Output),
            ">>" => Operator::Redirect(RedirectKind::Append),
            "<" => Operator::Redirect(RedirectKind::Input),
            "2>" => Operator::Redirect(RedirectKind::Stderr),
            ">&" => Operator::Redirect(RedirectKind::Both),
            _ => return None,
        })
    }
}

/// The leftmost operator in `argv` and its position.
pub fn find_operator(argv: &[String]) -> Option<(usize, Operator)> {
    argv.iter()
        .enumerate()
        .find_map(|(i, token)| Operator::from_token(token).map(|op| (i, op)))
}

/// What an argument vector asks for once its first operator is taken apart.
#[derive(Debug, PartialEq, Eq)]
pub enum Invocation<'a> {
    /// No operator: run as-is.
    Plain(&'a [String]),
    /// `cmd & rest`: `rest` runs first in the foreground, then `cmd` in the background.
    Background {
        command: &'a [String],
        trailing: &'a [String],
    },
    /// `cmd OP target`: everything after `target` is dropped.
    Redirect {
        command: &'a [String],
        kind: RedirectKind,
        target: Option<&'a str>,
    },
}

/// Split `argv` at its leftmost operator.
pub fn parse_invocation(argv: &[String]) -> Invocation<'_> {
    match find_operator(argv) {
        None => Invocation::Plain(argv),
        Some((k, Operator::Background)) => Invocation::Background {
            command: &argv[..k],
            trailing: &argv[k + 1..],
        },
        Some((k, Operator::Redirect(kind))) => Invocation::Redirect {
            command: &argv[..k],
            kind,
            target: argv.get(k + 1).map(String::as_str),
        },
    }
}
