//! Windowed substring searches over accumulated console output.
//!
//! Completion detection repeatedly asks "does this token occur at or after
//! the position where the echoed command ended?". The helpers here answer
//! that with explicit window semantics: a minimum offset past the end of the
//! data is vacuously "not found" (never an error), and a maximum at or
//! before the minimum means "search to the end".

use memchr::memmem;

/// How much of the text [`strip_prompt`] is allowed to rewrite.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StripLimit {
    /// Remove the first occurrence of the prompt token.
    First,
    /// Remove every occurrence. Applying this mode twice yields the same
    /// result as applying it once.
    All,
    /// Remove the first occurrence only if it starts before the given byte
    /// offset; otherwise the text is returned unchanged.
    Before(usize),
}

/// Clamps the caller-supplied window to the data, or rejects it outright.
fn window(data: &str, minimum: usize, maximum: usize) -> Option<(usize, usize)> {
    if minimum >= data.len() {
        return None;
    }
    let end = if maximum <= minimum {
        data.len()
    } else {
        maximum.min(data.len())
    };
    Some((minimum, end))
}

/// Returns the byte position of the first occurrence of `needle` that lies
/// entirely within `[minimum, maximum)` of `data`.
///
/// `maximum <= minimum` searches to the end of the data. A `minimum` at or
/// past the end of the data finds nothing.
pub fn position_in_window(
    data: &str,
    needle: &str,
    minimum: usize,
    maximum: usize,
) -> Option<usize> {
    let (start, end) = window(data, minimum, maximum)?;
    memmem::find(&data.as_bytes()[start..end], needle.as_bytes()).map(|offset| start + offset)
}

/// Like [`position_in_window`], but returns the highest matching position.
pub fn rposition_in_window(
    data: &str,
    needle: &str,
    minimum: usize,
    maximum: usize,
) -> Option<usize> {
    let (start, end) = window(data, minimum, maximum)?;
    memmem::rfind(&data.as_bytes()[start..end], needle.as_bytes()).map(|offset| start + offset)
}

/// Reports whether `needle` occurs entirely within `[minimum, maximum)`.
pub fn contains_in_window(data: &str, needle: &str, minimum: usize, maximum: usize) -> bool {
    position_in_window(data, needle, minimum, maximum).is_some()
}

/// Removes the echoed `<prompt>>` token from console output.
///
/// Devices print the prompt before (and sometimes inside) command output;
/// callers strip it before parsing listings or presenting text.
pub fn strip_prompt(data: &str, prompt: &str, limit: StripLimit) -> String {
    let token = format!("{prompt}>");
    match limit {
        StripLimit::First => data.replacen(&token, "", 1),
        StripLimit::All => data.replace(&token, ""),
        StripLimit::Before(boundary) => match data.find(&token) {
            Some(position) if position < boundary => data.replacen(&token, "", 1),
            _ => data.to_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn finds_token_within_window() {
        let data = "noise\r\nAV3>more";
        assert_eq!(position_in_window(data, "AV3>", 0, 0), Some(7));
        assert!(contains_in_window(data, "AV3>", 7, 0));
        assert!(contains_in_window(data, "AV3>", 7, 11));
    }

    #[test]
    fn minimum_past_occurrence_rejects_match() {
        let data = "noise\r\nAV3>more";
        assert!(!contains_in_window(data, "AV3>", 8, 0));
        assert_eq!(position_in_window(data, "AV3>", 8, 0), None);
    }

    #[test]
    fn maximum_truncates_the_window() {
        let data = "noise\r\nAV3>more";
        // The token ends at byte 11, so a window ending at 10 cuts it off.
        assert!(!contains_in_window(data, "AV3>", 0, 10));
        assert!(contains_in_window(data, "AV3>", 0, 11));
    }

    #[test]
    fn maximum_at_or_before_minimum_searches_to_end() {
        let data = "noise\r\nAV3>more";
        assert!(contains_in_window(data, "AV3>", 7, 7));
        assert!(contains_in_window(data, "AV3>", 7, 3));
    }

    #[test]
    fn minimum_past_end_of_data_is_vacuously_false() {
        let data = "AV3>";
        assert!(!contains_in_window(data, "AV3>", data.len(), 0));
        assert_eq!(position_in_window(data, "AV3>", 1000, 0), None);
    }

    #[test]
    fn reverse_search_returns_highest_position() {
        let data = "AV3> one AV3> two";
        assert_eq!(rposition_in_window(data, "AV3>", 0, 0), Some(9));
        assert_eq!(rposition_in_window(data, "AV3>", 0, 9), Some(0));
    }

    #[test]
    fn strip_first_removes_a_single_occurrence() {
        let stripped = strip_prompt("AV3>dir\r\nAV3>", "AV3", StripLimit::First);
        assert_eq!(stripped, "dir\r\nAV3>");
    }

    #[test]
    fn strip_all_is_idempotent() {
        let once = strip_prompt("AV3> a AV3> b AV3>", "AV3", StripLimit::All);
        let twice = strip_prompt(&once, "AV3", StripLimit::All);
        assert_eq!(once, " a  b ");
        assert_eq!(once, twice);
    }

    #[test]
    fn strip_before_honours_the_boundary() {
        let data = "output AV3> tail";
        assert_eq!(strip_prompt(data, "AV3", StripLimit::Before(8)), "output  tail");
        assert_eq!(strip_prompt(data, "AV3", StripLimit::Before(7)), data);
    }

    proptest! {
        /// A prompt token planted at a known offset is found exactly when the
        /// window admits it.
        #[test]
        fn window_admits_planted_token(
            prefix in "[a-z \r\n]{0,40}",
            suffix in "[a-z \r\n]{0,40}",
            minimum in 0usize..100,
        ) {
            let token = "CP3-00A1>";
            let data = format!("{prefix}{token}{suffix}");
            let offset = prefix.len();
            let found = contains_in_window(&data, token, minimum, 0);
            // The prefix alphabet cannot form the token, so the planted
            // occurrence is the only one.
            prop_assert_eq!(found, minimum <= offset && minimum < data.len());
        }
    }
}
