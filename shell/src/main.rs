use argh::FromArgs;
use rush::command::report;
use rush::{Environment, FileHistory, Interpreter, terminal};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// rush, an interactive shell. Set RUSH_LOG (e.g. RUSH_LOG=debug) for diagnostics.
#[derive(FromArgs)]
struct Args {}

fn run() -> anyhow::Result<()> {
    terminal::exit_on_signals()?;

    let env = Environment::new();
    env.search_paths()?;
    let history = FileHistory::open(env.history_path()?)?;

    Interpreter::new(env, Box::new(history)).repl()
}

fn main() -> ExitCode {
    let _args: Args = argh::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUSH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}
