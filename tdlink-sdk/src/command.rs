//! Bot-style command parsing for message text.
//!
//! A command is text starting with `/`, optionally addressed to a bot with
//! `@name` and followed by a space-separated argument:
//! `/start@my_bot payload`.

/// Whether the text is a command.
pub fn is_command(text: &str) -> bool {
    text.starts_with('/')
}

/// The command part of the text, without bot address or argument.
///
/// Returns `None` when the text is not a command.
pub fn check_command(text: &str) -> Option<&str> {
    if !is_command(text) {
        return None;
    }
    // "@" takes precedence over " " when both are present.
    let end = text.find('@').or_else(|| text.find(' '));
    match end {
        Some(i) if i > 0 => Some(&text[..i]),
        _ => Some(text),
    }
}

/// The argument following the first space of a command.
pub fn command_argument(text: &str) -> Option<&str> {
    if !is_command(text) {
        return None;
    }
    text.find(' ').map(|i| &text[i + 1..])
}
