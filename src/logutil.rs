//! Helpers for putting chat-supplied text (usernames, raw commands, quest descriptions) into
//! log lines without breaking them across several lines.

/// Longest preview kept in a log line, in characters.
pub const MAX_LOG_PREVIEW: usize = 160;

/// Escape control characters and cap the length so one value is always one log line.
pub fn escape_log(s: &str) -> String {
    escape_with_limit(s, MAX_LOG_PREVIEW)
}

pub fn escape_with_limit(s: &str, limit: usize) -> String {
    let mut out = String::with_capacity(s.len().min(limit) + 4);
    for (n, ch) in s.chars().enumerate() {
        if n == limit {
            out.push('…');
            break;
        }
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => out.extend(c.escape_unicode()),
            c => out.push(c),
        }
    }
    out
}

/// `name (id)` for log lines that mention a player.
pub fn player_label(id: u64, username: &str) -> String {
    format!("{} ({})", escape_with_limit(username, 40), id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_line_input_stays_on_one_line() {
        assert_eq!(escape_log("open\nevent\t3"), "open\\nevent\\t3");
        assert_eq!(escape_log("a\\b"), "a\\\\b");
        assert_eq!(escape_log("\u{7}"), "\\u{7}");
    }

    #[test]
    fn long_values_are_cut_on_char_boundaries() {
        let long = "é".repeat(MAX_LOG_PREVIEW + 10);
        let escaped = escape_log(&long);
        assert_eq!(escaped.chars().count(), MAX_LOG_PREVIEW + 1);
        assert!(escaped.ends_with('…'));
    }

    #[test]
    fn player_labels_escape_names() {
        assert_eq!(player_label(7, "ash\nketchum"), "ash\\nketchum (7)");
    }
}
