use std::fmt;

use teloxide::types::ParseMode;

/// Output formatting modes for Telegram text, richest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatMode {
    MarkdownV2,
    Html,
    Plain,
}

impl FormatMode {
    /// Order in which a rejected payload is retried.
    pub const FALLBACK_CHAIN: [FormatMode; 3] =
        [FormatMode::MarkdownV2, FormatMode::Html, FormatMode::Plain];

    pub fn parse_mode(&self) -> Option<ParseMode> {
        match self {
            FormatMode::MarkdownV2 => Some(ParseMode::MarkdownV2),
            FormatMode::Html => Some(ParseMode::Html),
            FormatMode::Plain => None,
        }
    }
}

impl fmt::Display for FormatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatMode::MarkdownV2 => "MarkdownV2",
            FormatMode::Html => "HTML",
            FormatMode::Plain => "plain",
        };
        f.write_str(name)
    }
}

/// Render model output for the given mode.
pub fn render(text: &str, mode: FormatMode) -> String {
    match mode {
        FormatMode::MarkdownV2 => to_telegram_markdown(text),
        FormatMode::Html => teloxide::utils::html::escape(text),
        FormatMode::Plain => text.to_string(),
    }
}

/// Convert the markdown Gemini usually emits into Telegram MarkdownV2.
///
/// - Fenced code blocks and inline code keep their content, with only `` ` ``
///   and `\` escaped as MarkdownV2 requires inside code entities.
/// - `**bold**` becomes `*bold*`.
/// - A `* ` or `- ` list marker at the start of a line becomes `•`.
/// - Every other reserved character is escaped.
///
/// Unbalanced markers are escaped as literal text.
pub fn to_telegram_markdown(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 2);
    let mut rest = input;
    let mut line_start = true;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("```") {
            if let Some(end) = after.find("```") {
                out.push_str("```");
                escape_code(&after[..end], &mut out);
                out.push_str("```");
                line_start = after[..end].ends_with('\n');
                rest = &after[end + 3..];
                continue;
            }
        }

        if let Some(after) = rest.strip_prefix('`') {
            if let Some(end) = after.find(['`', '\n']) {
                if after[end..].starts_with('`') && end > 0 {
                    out.push('`');
                    escape_code(&after[..end], &mut out);
                    out.push('`');
                    line_start = false;
                    rest = &after[end + 1..];
                    continue;
                }
            }
        }

        if let Some(after) = rest.strip_prefix("**") {
            if let Some(end) = after.find("**") {
                if end > 0 && !after[..end].contains('\n') {
                    out.push('*');
                    escape_text(&after[..end], &mut out);
                    out.push('*');
                    line_start = false;
                    rest = &after[end + 2..];
                    continue;
                }
            }
        }

        if line_start {
            let indent = rest.len() - rest.trim_start_matches([' ', '\t']).len();
            let body = &rest[indent..];
            if body.starts_with("* ") || body.starts_with("- ") {
                out.push_str(&rest[..indent]);
                out.push('•');
                rest = &body[1..];
                line_start = false;
                continue;
            }
        }

        let Some(c) = rest.chars().next() else {
            break;
        };
        if is_special(c) {
            out.push('\\');
        }
        out.push(c);
        line_start = c == '\n';
        rest = &rest[c.len_utf8()..];
    }

    out
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        if is_special(c) {
            out.push('\\');
        }
        out.push(c);
    }
}

fn escape_code(code: &str, out: &mut String) {
    for c in code.chars() {
        if c == '`' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
}

fn is_special(c: char) -> bool {
    matches!(
        c,
        '_' | '*'
            | '['
            | ']'
            | '('
            | ')'
            | '~'
            | '`'
            | '>'
            | '#'
            | '+'
            | '-'
            | '='
            | '|'
            | '{'
            | '}'
            | '.'
            | '!'
            | '\\'
    )
}

/// Split `text` into segments of at most `limit` UTF-16 code units, the unit
/// Telegram measures message length in.
///
/// A segment ends at the last newline inside its window when there is one;
/// that newline is dropped. Otherwise the window is cut at the limit.
/// Always returns at least one segment.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut segments = Vec::new();
    let mut rest = text;

    loop {
        let window_end = match utf16_window_end(rest, limit) {
            Some(idx) => idx,
            None => {
                segments.push(rest.to_string());
                break;
            }
        };

        let window = &rest[..window_end];
        if rest[window_end..].starts_with('\n') {
            segments.push(window.to_string());
            rest = &rest[window_end + 1..];
            if rest.is_empty() {
                break;
            }
            continue;
        }
        match window.rfind('\n') {
            Some(nl) if nl > 0 => {
                segments.push(window[..nl].to_string());
                rest = &rest[nl + 1..];
            }
            _ => {
                segments.push(window.to_string());
                rest = &rest[window_end..];
            }
        }

        if rest.is_empty() {
            break;
        }
    }

    segments
}

/// Byte offset where the first `limit` UTF-16 units of `text` end, or `None`
/// when the whole text fits. A window always holds at least one char.
fn utf16_window_end(text: &str, limit: usize) -> Option<usize> {
    let mut units = 0;
    for (idx, c) in text.char_indices() {
        units += c.len_utf16();
        if units > limit {
            return Some(if idx == 0 { c.len_utf8() } else { idx });
        }
    }
    None
}
