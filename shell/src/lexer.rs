//! Splitting raw input lines into argument vectors and pipeline stages.
//!
//! There is no quoting or escaping: a word is any run of bytes between
//! delimiters, and `|` always separates pipeline stages.

/// Bytes that separate words: space, tab, carriage return, newline and bell.
pub const DELIMITERS: &[char] = &[' ', '\t', '\r', '\n', '\x07'];

/// Flag appended after commands that support colored output.
pub const COLOR_FLAG: &str = "--color=auto";

/// Command prefixes that get [`COLOR_FLAG`] inserted after them.
const COLORED_COMMANDS: &[&str] = &["ls", "diff", "grep"];

/// Split a line on runs of whitespace, discarding empty tokens.
pub fn split_args(line: &str) -> Vec<String> {
    line.split(DELIMITERS)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a line on `|` and tokenize each trimmed stage.
///
/// A line without pipes yields a single stage; an empty line yields one empty stage.
pub fn split_pipeline(line: &str) -> Vec<Vec<String>> {
    line.split('|')
        .map(|stage| split_args(stage.trim_matches(DELIMITERS)))
        .collect()
}

/// Insert [`COLOR_FLAG`] right after every token starting with `ls`, `diff` or `grep`.
///
/// Any position qualifies, not only the command name, so `sudo ls` is covered too.
pub fn augment(argv: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(argv.len() + 1);
    for token in argv {
        let colored = COLORED_COMMANDS
            .iter()
            .any(|prefix| token.starts_with(prefix));
        out.push(token);
        if colored {
            out.push(COLOR_FLAG.to_string());
        }
    }
    out
}

/// Whether the line must go through the pipeline executor.
pub fn has_pipe(line: &str) -> bool {
    line.contains('|')
}
