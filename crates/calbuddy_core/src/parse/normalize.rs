//! Whitespace cleanup for raw listing lines.
//!
//! # Invariants
//! - Normalization is pure and idempotent.
//! - Output never contains NUL, which is reserved as the identity delimiter.

use once_cell::sync::Lazy;
use regex::Regex;

static HORIZONTAL_WS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t\r\x0C\x0B]+").expect("valid horizontal whitespace regex"));

/// Space-like code points emitted by calendar tools in place of a plain space.
const SPACE_LIKE: [char; 3] = ['\u{00A0}', '\u{202F}', '\u{2009}'];

/// Normalizes one raw line.
///
/// Replaces non-breaking, narrow no-break and thin spaces with a plain space,
/// drops NUL characters and collapses runs of horizontal whitespace.
pub fn normalize_line(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .filter(|ch| *ch != '\0')
        .map(|ch| if SPACE_LIKE.contains(&ch) { ' ' } else { ch })
        .collect();
    HORIZONTAL_WS_RE.replace_all(&replaced, " ").into_owned()
}

/// Splits a whole listing into normalized lines.
pub fn normalize_text(raw: &str) -> Vec<String> {
    raw.lines().map(normalize_line).collect()
}

#[cfg(test)]
mod tests {
    use super::{normalize_line, normalize_text};

    #[test]
    fn replaces_space_like_code_points() {
        assert_eq!(
            normalize_line("11:30\u{202F}AM\u{00A0}-\u{2009}12:00 PM"),
            "11:30 AM - 12:00 PM"
        );
    }

    #[test]
    fn collapses_horizontal_whitespace_runs() {
        assert_eq!(normalize_line("  a \t\t b\r"), " a b ");
    }

    #[test]
    fn drops_nul_characters() {
        assert_eq!(normalize_line("ti\0tle"), "title");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_line("\u{00A0}\u{00A0}x \t y\u{2009}\u{2009}z");
        assert_eq!(normalize_line(&once), once);
    }

    #[test]
    fn normalize_text_splits_lines() {
        let lines = normalize_text("• Standup\n    10:00 - 10:15\n");
        assert_eq!(lines, vec!["• Standup".to_string(), " 10:00 - 10:15".to_string()]);
    }
}
