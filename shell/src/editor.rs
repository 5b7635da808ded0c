//! The interactive line editor.
//!
//! Reads the terminal one byte at a time (the caller puts it in raw mode) and
//! does all of the echoing itself: every keystroke that changes the line
//! redraws it from the start with the command name highlighted.

use crate::color::{Color, colorize};
use crate::command;
use crate::history::HistoryStore;
use crate::lexer::DELIMITERS;
use anyhow::Result;
use std::io::{self, Read, Write};
use std::path::PathBuf;

/// Capacity the buffer starts with and grows by.
pub const BUFFER_INCREMENT: usize = 1024;

const ESC: u8 = 0x1b;
const EOT: u8 = 0x04;
const DEL: u8 = 0x7f;

/// The line being edited and the cursor inside it.
///
/// `0 <= cursor <= len()` always holds. Storage grows in [`BUFFER_INCREMENT`]
/// steps and is never released while editing.
#[derive(Debug)]
pub struct InputBuffer {
    bytes: Vec<u8>,
    cursor: usize,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self {
            bytes: Vec::with_capacity(BUFFER_INCREMENT),
            cursor: 0,
        }
    }

    /// Insert `byte` at the cursor and step past it.
    pub fn insert(&mut self, byte: u8) {
        if self.bytes.len() + 1 >= self.bytes.capacity() {
            self.bytes.reserve_exact(BUFFER_INCREMENT);
        }
        self.bytes.insert(self.cursor, byte);
        self.cursor += 1;
    }

    /// Delete the byte left of the cursor. Returns false at the start of the line.
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.bytes.remove(self.cursor);
        true
    }

    pub fn move_left(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    pub fn move_right(&mut self) -> bool {
        if self.cursor == self.bytes.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    /// Replace the whole line, leaving the cursor at its end.
    pub fn set(&mut self, text: &str) {
        self.bytes.clear();
        if text.len() >= self.bytes.capacity() {
            self.bytes.reserve_exact(text.len() + BUFFER_INCREMENT);
        }
        self.bytes.extend_from_slice(text.as_bytes());
        self.cursor = self.bytes.len();
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.cursor = 0;
    }

    /// Substitute the first occurrence of `pattern` with `with`.
    ///
    /// Returns false (and leaves the line alone) when `pattern` is absent.
    pub fn replace_first(&mut self, pattern: &str, with: &str) -> bool {
        let text = self.text();
        match text.find(pattern) {
            Some(_) => {
                self.set(&text.replacen(pattern, with, 1));
                true
            }
            None => false,
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.text().contains(pattern)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.bytes.capacity()
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// What one call to [`LineEditor::read_line`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A submitted, non-empty line.
    Line(String),
    /// Enter on an empty line.
    Empty,
    /// The input stream ended, or Ctrl-D on an empty line.
    Eof,
}

/// Keys an escape sequence can stand for.
enum Arrow {
    Up,
    Down,
    Right,
    Left,
}

/// Line editing state that lives across keystrokes of a single read.
#[derive(Debug, Default)]
pub struct LineEditor {
    buffer: InputBuffer,
    /// How far back into history Up has gone; 0 means "not recalling".
    recall: usize,
    /// Columns between the start of the line and the terminal cursor.
    drawn: usize,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edit one line read from `input`, rendering to `out`.
    ///
    /// `history` is consulted for Up/Down and `!!`; `paths` decides whether the
    /// command name is drawn as runnable.
    pub fn read_line<R: Read, W: Write>(
        &mut self,
        input: &mut R,
        out: &mut W,
        history: &dyn HistoryStore,
        paths: &[PathBuf],
    ) -> Result<ReadOutcome> {
        self.buffer.clear();
        self.recall = 0;
        self.drawn = 0;

        loop {
            let Some(byte) = read_byte(input)? else {
                writeln!(out)?;
                out.flush()?;
                return Ok(ReadOutcome::Eof);
            };

            match byte {
                b'\n' => {
                    if self.buffer.is_empty() {
                        writeln!(out)?;
                        out.flush()?;
                        return Ok(ReadOutcome::Empty);
                    }
                    if self.buffer.contains("!!") {
                        if let Some(previous) = self.recall_older(history)? {
                            self.buffer.replace_first("!!", &previous);
                            self.redraw(out, paths)?;
                            continue;
                        }
                    }
                    writeln!(out)?;
                    out.flush()?;
                    return Ok(ReadOutcome::Line(self.buffer.text()));
                }
                EOT if self.buffer.is_empty() => {
                    writeln!(out)?;
                    out.flush()?;
                    return Ok(ReadOutcome::Eof);
                }
                DEL => {
                    if self.buffer.backspace() {
                        self.redraw(out, paths)?;
                    }
                }
                ESC => match read_arrow(input)? {
                    Some(Arrow::Up) => {
                        if let Some(entry) = self.recall_older(history)? {
                            self.buffer.set(&entry);
                            self.redraw(out, paths)?;
                        }
                    }
                    Some(Arrow::Down) => {
                        match self.recall_newer(history)? {
                            Some(entry) => self.buffer.set(&entry),
                            None => self.buffer.clear(),
                        }
                        self.redraw(out, paths)?;
                    }
                    Some(Arrow::Right) => {
                        if self.buffer.move_right() {
                            write!(out, "\x1b[1C")?;
                            self.drawn += 1;
                            out.flush()?;
                        }
                    }
                    Some(Arrow::Left) => {
                        if self.buffer.move_left() {
                            write!(out, "\x1b[1D")?;
                            self.drawn -= 1;
                            out.flush()?;
                        }
                    }
                    None => {}
                },
                0x20..=0x7e => {
                    self.buffer.insert(byte);
                    self.redraw(out, paths)?;
                }
                _ => {}
            }
        }
    }

    fn recall_older(&mut self, history: &dyn HistoryStore) -> Result<Option<String>> {
        let entries = history.read_all(false)?;
        if self.recall >= entries.len() {
            return Ok(None);
        }
        self.recall += 1;
        Ok(Some(entries[entries.len() - self.recall].clone()))
    }

    fn recall_newer(&mut self, history: &dyn HistoryStore) -> Result<Option<String>> {
        if self.recall == 0 {
            return Ok(None);
        }
        self.recall -= 1;
        if self.recall == 0 {
            return Ok(None);
        }
        let entries = history.read_all(false)?;
        Ok(entries.len().checked_sub(self.recall).map(|i| entries[i].clone()))
    }

    /// Back to the start of the line, clear it, print it highlighted and put
    /// the terminal cursor where the edit cursor is.
    fn redraw<W: Write>(&mut self, out: &mut W, paths: &[PathBuf]) -> io::Result<()> {
        if self.drawn > 0 {
            write!(out, "\x1b[{}D", self.drawn)?;
        }
        write!(out, "\x1b[K{}", highlight(&self.buffer.text(), paths))?;
        let behind = self.buffer.len() - self.buffer.cursor();
        if behind > 0 {
            write!(out, "\x1b[{}D", behind)?;
        }
        self.drawn = self.buffer.cursor();
        out.flush()
    }
}

/// Color the first word green when it would run, red otherwise.
pub fn highlight(line: &str, paths: &[PathBuf]) -> String {
    let rest = line.trim_start_matches(DELIMITERS);
    let indent = &line[..line.len() - rest.len()];
    let end = rest.find(DELIMITERS).unwrap_or(rest.len());
    let (word, tail) = rest.split_at(end);
    if word.is_empty() {
        return line.to_string();
    }
    let color = if command::resolves(word, paths) {
        Color::Green
    } else {
        Color::Red
    };
    format!("{}{}{}", indent, colorize(word, color), tail)
}

fn read_byte<R: Read>(input: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match input.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Decode the rest of `ESC [ X`. Anything else is swallowed and ignored.
fn read_arrow<R: Read>(input: &mut R) -> io::Result<Option<Arrow>> {
    if read_byte(input)? != Some(b'[') {
        return Ok(None);
    }
    Ok(match read_byte(input)? {
        Some(b'A') => Some(Arrow::Up),
        Some(b'B') => Some(Arrow::Down),
        Some(b'C') => Some(Arrow::Right),
        Some(b'D') => Some(Arrow::Left),
        _ => None,
    })
}
