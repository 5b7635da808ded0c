//! rush: a small interactive shell.
//!
//! Lines are read by a raw-mode line editor with history recall and live
//! highlighting of the command name, split on whitespace and `|`, and run
//! either as built-ins inside the shell process or as forked programs. Single
//! commands understand the `&`, `>`, `>>`, `<`, `2>` and `>&` operators;
//! pipelines chain any number of stages.
//!
//! The main entry point is [`Interpreter`]. [`Environment`] carries the
//! variables and working directory commands see, and [`HistoryStore`] is the
//! seam for where submitted lines are kept.

mod builtin;
pub mod color;
pub mod command;
pub mod editor;
pub mod env;
mod external;
pub mod history;
mod interpreter;
pub mod job;
pub mod lexer;
pub mod parser;
mod pipeline;
pub mod terminal;

pub use command::{FatalError, Flow};
pub use env::Environment;
pub use history::{FileHistory, HistoryStore};
/// The interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
