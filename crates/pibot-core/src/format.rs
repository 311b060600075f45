//! Text helpers for the rich-text subset the transport understands.

pub const HEAD_TRUNCATION_MARKER: &str = "\n... (output truncated)";
pub const TAIL_TRUNCATION_MARKER: &str = "... (earlier output truncated)\n";

pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

pub fn code(text: &str) -> String {
    format!("<code>{}</code>", html_escape(text))
}

pub fn pre(text: &str) -> String {
    format!("<pre>{}</pre>", html_escape(text))
}

/// Keeps the first `cap` characters. Used for forward logs such as script output.
pub fn truncate_head(text: &str, cap: usize) -> String {
    match text.char_indices().nth(cap) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}{HEAD_TRUNCATION_MARKER}", &text[..cut]),
    }
}

/// Shortens a one-line label to `cap` characters plus an ellipsis.
pub fn ellipsize(text: &str, cap: usize) -> String {
    match text.char_indices().nth(cap) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}…", &text[..cut]),
    }
}

/// Keeps the last `cap` characters. Used for "last N lines" style output.
pub fn truncate_tail(text: &str, cap: usize) -> String {
    let total = text.chars().count();
    if total <= cap {
        return text.to_string();
    }
    let skip = total - cap;
    let cut = text
        .char_indices()
        .nth(skip)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    format!("{TAIL_TRUNCATION_MARKER}{}", &text[cut..])
}

pub fn format_bytes(size: u64) -> String {
    let mut value = size as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} TB")
}

/// `HH:MM:SS`; hours keep counting past a day instead of wrapping.
pub fn format_uptime(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
