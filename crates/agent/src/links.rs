//! Link Extractor
//!
//! Surfaces a navigation or website link from a generated answer so
//! clients can render it as a button. The answer text is never modified.

use once_cell::sync::Lazy;
use regex::Regex;

use campus_guide_core::PipelineResult;

static MAPS_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https://www\.google\.com/maps/dir/\?api=1&destination=[^\s\]\)\}]+").unwrap()
});

static ANY_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s\]\)\}]+").unwrap());

/// First navigation link, otherwise first web link
pub fn find_link(answer: &str) -> Option<&str> {
    MAPS_LINK
        .find(answer)
        .or_else(|| ANY_LINK.find(answer))
        .map(|m| m.as_str())
}

/// Answer text (unchanged) plus the link found in it, if any
pub fn extract(answer: &str) -> (String, Option<String>) {
    let link = find_link(answer).map(str::to_string);
    if let Some(link) = &link {
        tracing::debug!(link = %link, "Found link in answer");
    }
    (answer.to_string(), link)
}

/// Build the turn result from a finished answer
pub fn to_result(answer: String) -> PipelineResult {
    let link = find_link(&answer).map(str::to_string);
    PipelineResult::new(answer, link)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_link() {
        let text = "Navigate: https://www.google.com/maps/dir/?api=1&destination=49.0,8.4";
        let (answer, link) = extract(text);
        assert_eq!(answer, text);
        assert_eq!(
            link.as_deref(),
            Some("https://www.google.com/maps/dir/?api=1&destination=49.0,8.4")
        );
    }

    #[test]
    fn test_no_link() {
        let (answer, link) = extract("No links here.");
        assert_eq!(answer, "No links here.");
        assert!(link.is_none());
    }

    #[test]
    fn test_navigation_link_preferred_over_earlier_website() {
        let text = "Webseite: https://www.kit.edu/mensa (Infos). Route: \
                    [Karte](https://www.google.com/maps/dir/?api=1&destination=KIT) und mehr.";
        assert_eq!(
            find_link(text),
            Some("https://www.google.com/maps/dir/?api=1&destination=KIT")
        );
    }

    #[test]
    fn test_website_link_stops_at_brackets() {
        let text = "Mehr Infos (https://www.bibliothek.kit.edu/oeffnungszeiten) gibt es online.";
        assert_eq!(
            find_link(text),
            Some("https://www.bibliothek.kit.edu/oeffnungszeiten")
        );
    }

    #[test]
    fn test_to_result_keeps_text() {
        let result = to_result("Siehe http://example.org/a".to_string());
        assert_eq!(result.answer, "Siehe http://example.org/a");
        assert_eq!(result.link.as_deref(), Some("http://example.org/a"));
    }
}
