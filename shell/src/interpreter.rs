use crate::color::{Color, colorize};
use crate::command::{Flow, Resolved, is_fatal, report};
use crate::editor::{LineEditor, ReadOutcome};
use crate::env::Environment;
use crate::external::{self, LaunchOptions, Redirection};
use crate::history::HistoryStore;
use crate::job::JobTable;
use crate::lexer;
use crate::parser::{self, Invocation};
use crate::terminal::{self, RawMode};
use anyhow::Result;
use std::io::{self, Write};

/// An interactive shell: the environment it runs commands in, the jobs it
/// started and the history it recalls from.
///
/// Example
/// ```no_run
/// use rush::{Environment, FileHistory, Interpreter};
/// let env = Environment::new();
/// let history = FileHistory::open(env.history_path().unwrap()).unwrap();
/// let mut sh = Interpreter::new(env, Box::new(history));
/// sh.run_line("ls -la | wc -l").unwrap();
/// ```
pub struct Interpreter {
    pub(crate) env: Environment,
    pub(crate) jobs: JobTable,
    pub(crate) history: Box<dyn HistoryStore>,
}

impl Interpreter {
    pub fn new(env: Environment, history: Box<dyn HistoryStore>) -> Self {
        Self {
            env,
            jobs: JobTable::new(),
            history,
        }
    }

    /// Prompt, read, record and run lines until `exit` or end of input.
    pub fn repl(&mut self) -> Result<()> {
        let mut editor = LineEditor::new();
        // Children share fd 0, so nothing past the submitted line may be read ahead.
        let mut input = terminal::unbuffered_reader(io::stdin())?;
        let mut stdout = io::stdout();

        loop {
            self.jobs.reap();
            write!(stdout, "{}", self.prompt())?;
            stdout.flush()?;

            let paths = self.env.search_paths()?;
            let outcome = {
                let _raw = RawMode::enable()?;
                editor.read_line(&mut input, &mut stdout, self.history.as_ref(), &paths)?
            };

            match outcome {
                ReadOutcome::Eof => return Ok(()),
                ReadOutcome::Empty => continue,
                ReadOutcome::Line(line) => {
                    self.history.append(&line)?;
                    if self.run_line(&line)? == Flow::Stop {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Run one line of input, piped or not.
    ///
    /// Failures of the command itself are reported and swallowed; only fatal
    /// errors come back as `Err`.
    pub fn run_line(&mut self, line: &str) -> Result<Flow> {
        let result = if lexer::has_pipe(line) {
            let stages: Vec<Vec<String>> = lexer::split_pipeline(line)
                .into_iter()
                .map(lexer::augment)
                .collect();
            self.execute_pipe(&stages)
        } else {
            self.execute(&lexer::augment(lexer::split_args(line)))
        };

        match result {
            Err(e) if !is_fatal(&e) => {
                report(&e);
                Ok(Flow::Continue)
            }
            other => other,
        }
    }

    /// Run a single argument vector: a built-in in-process, anything else forked.
    pub fn execute(&mut self, argv: &[String]) -> Result<Flow> {
        let Some(name) = argv.first() else {
            return Ok(Flow::Continue);
        };
        match Resolved::of(name) {
            Resolved::Builtin(builtin) => builtin.run(&argv[1..], &mut io::stdout(), self),
            Resolved::External(_) => self.execute_external(argv),
        }
    }

    fn execute_external(&mut self, argv: &[String]) -> Result<Flow> {
        match parser::parse_invocation(argv) {
            Invocation::Plain(command) => self.launch(command, LaunchOptions::default()),
            Invocation::Background { command, trailing } => {
                // Words after `&` run first, in the foreground.
                let flow = self.execute(trailing)?;
                self.launch(
                    command,
                    LaunchOptions {
                        redirect: None,
                        background: true,
                    },
                )?;
                Ok(flow)
            }
            Invocation::Redirect {
                command,
                kind,
                target,
            } => {
                let target = target
                    .ok_or_else(|| anyhow::anyhow!("syntax error: missing file name after redirection"))?;
                let redirect = Redirection::open(kind, target)?;
                self.launch(
                    command,
                    LaunchOptions {
                        redirect: Some(redirect),
                        background: false,
                    },
                )
            }
        }
    }

    fn launch(&mut self, argv: &[String], options: LaunchOptions) -> Result<Flow> {
        external::launch(argv, options, &self.env, &mut self.jobs)
    }

    /// `[HH:MM:SS] [~/dir] > ` in the prompt colors.
    fn prompt(&self) -> String {
        let time = chrono::Local::now().format("[%H:%M:%S]").to_string();
        let cwd = match self.env.home() {
            Some(home) => match self.env.current_dir.strip_prefix(&home) {
                Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
                Ok(rest) => format!("~/{}", rest.display()),
                Err(_) => self.env.current_dir.display().to_string(),
            },
            None => self.env.current_dir.display().to_string(),
        };
        format!(
            "{} {} {} ",
            colorize(&time, Color::Blue),
            colorize(&format!("[{}]", cwd), Color::Magenta),
            colorize(">", Color::Cyan)
        )
    }
}
