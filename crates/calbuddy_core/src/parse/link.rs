//! Meeting link extraction from an event's buffered lines.
//!
//! # Invariants
//! - Known provider links win in provider-priority order, not line order.
//! - Without a provider match, the first URL in line order wins.

use once_cell::sync::Lazy;
use regex::Regex;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^\s'")<>]+"#).expect("valid url regex"));

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', ')', '\'', '"'];

/// Meeting provider markers, highest priority first.
pub const MEETING_PROVIDER_PRIORITY: [&str; 9] = [
    "zoom.us",
    "meet.google.com",
    "teams.microsoft.com",
    "webex.com",
    "gotomeeting.com",
    "gotowebinar.com",
    "jitsi",
    "whereby.com",
    "bluejeans.com",
];

/// Returns the best meeting URL found in `lines`, if any.
pub fn extract_meeting_link<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    let urls = collect_urls(lines);
    if urls.is_empty() {
        return None;
    }

    for provider in MEETING_PROVIDER_PRIORITY {
        if let Some(url) = urls
            .iter()
            .find(|url| url.to_ascii_lowercase().contains(provider))
        {
            return Some(url.clone());
        }
    }

    urls.into_iter().next()
}

/// Returns every URL in line order with trailing punctuation removed.
pub fn collect_urls<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    lines
        .iter()
        .flat_map(|line| URL_RE.find_iter(line.as_ref()))
        .map(|found| found.as_str().trim_end_matches(TRAILING_PUNCTUATION))
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{collect_urls, extract_meeting_link};

    #[test]
    fn strips_trailing_punctuation() {
        let urls = collect_urls(&["see (https://example.com/a)., or 'https://x.org/b'"]);
        assert_eq!(urls, vec!["https://example.com/a", "https://x.org/b"]);
    }

    #[test]
    fn returns_none_without_urls() {
        assert_eq!(extract_meeting_link(&["Location: Room 4"]), None);
        assert_eq!(extract_meeting_link::<&str>(&[]), None);
    }

    #[test]
    fn provider_priority_beats_line_order() {
        let lines = [
            "notes: https://teams.microsoft.com/l/meetup-join/1",
            "dial: https://zoom.us/j/99",
        ];
        assert_eq!(
            extract_meeting_link(&lines).as_deref(),
            Some("https://zoom.us/j/99")
        );
    }

    #[test]
    fn provider_match_is_case_insensitive() {
        let lines = ["https://example.com/doc", "HTTPS://Meet.Google.com/abc-defg-hij"];
        assert_eq!(
            extract_meeting_link(&lines).as_deref(),
            Some("HTTPS://Meet.Google.com/abc-defg-hij")
        );
    }
}
