use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::debug;

/// Append-only log of submitted command lines.
pub trait HistoryStore {
    /// Add one line at the end of the log.
    fn append(&mut self, line: &str) -> Result<()>;

    /// Every stored line in append order.
    ///
    /// With `dedup`, only the first occurrence of each distinct line is kept.
    fn read_all(&self, dedup: bool) -> Result<Vec<String>>;
}

/// History kept in a plain text file, one command per line.
#[derive(Debug, Clone)]
pub struct FileHistory {
    path: PathBuf,
}

impl FileHistory {
    /// Use the history file at `path`, creating it empty when absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            File::create(&path)
                .with_context(|| format!("error opening history file {}", path.display()))?;
            debug!(path = %path.display(), "created history file");
        }
        Ok(Self { path })
    }
}

impl HistoryStore for FileHistory {
    fn append(&mut self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("error opening history file {}", self.path.display()))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn read_all(&self, dedup: bool) -> Result<Vec<String>> {
        let file = File::open(&self.path)
            .with_context(|| format!("error opening history file {}", self.path.display()))?;
        let mut seen = HashSet::new();
        let mut lines = Vec::new();
        for line in BufReader::new(file).split(b'\n') {
            let line = String::from_utf8_lossy(&line?).into_owned();
            if dedup && !seen.insert(line.clone()) {
                continue;
            }
            lines.push(line);
        }
        Ok(lines)
    }
}
