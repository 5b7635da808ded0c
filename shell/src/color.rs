/// Terminal foreground colors used by the prompt and the line editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Blue,
    Magenta,
    Cyan,
}

impl Color {
    fn sgr(self) -> &'static str {
        match self {
            Color::Red => "31",
            Color::Green => "32",
            Color::Blue => "34",
            Color::Magenta => "35",
            Color::Cyan => "36",
        }
    }
}

/// Reset all attributes.
pub const RESET: &str = "\x1b[0m";

/// Wrap `text` so it prints in `color` and resets afterwards.
pub fn colorize(text: &str, color: Color) -> String {
    format!("\x1b[{}m{}{}", color.sgr(), text, RESET)
}
