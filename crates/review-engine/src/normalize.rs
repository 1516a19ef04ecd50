//! Input normalization.
//!
//! Every submission is cleaned exactly once, up front. The normalized string
//! is what goes to the analysis service and what every validated offset
//! points into, so this pass must be idempotent: running it on its own
//! output changes nothing.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    /// Control characters removed outright. Tab, newline and carriage
    /// return are left for the whitespace pass.
    static ref CONTROL_CHARS: Regex = Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap();

    /// Zero-width characters and the BOM.
    static ref ZERO_WIDTH: Regex = Regex::new("[\u{200B}-\u{200D}\u{FEFF}]").unwrap();

    /// Any whitespace run, including line breaks.
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Rejection reasons for a raw submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("text is empty or contains only whitespace")]
    Empty,

    #[error("text is too long: {len} characters (maximum {max})")]
    TooLong { len: usize, max: usize },

    #[error("text contains too many invalid characters")]
    TooManyInvalidChars,
}

/// Clean a raw submission for analysis and offset matching.
///
/// Strips control and zero-width characters, collapses every whitespace run
/// to a single space, and trims the ends. Fails when nothing survives, when
/// cleanup removed more than half of a non-trivial input, or when the result
/// exceeds `max_len` characters.
pub fn normalize(raw: &str, max_len: Option<usize>) -> Result<String, NormalizeError> {
    let original_len = raw.chars().count();

    let text = CONTROL_CHARS.replace_all(raw, "");
    let text = ZERO_WIDTH.replace_all(&text, "");
    let text = WHITESPACE_RUN.replace_all(&text, " ");
    let text = text.trim();

    if text.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let len = text.chars().count();

    // An input that loses more than half its characters to cleanup is
    // treated as garbage rather than silently gutted.
    if original_len > 100 && len * 2 < original_len {
        return Err(NormalizeError::TooManyInvalidChars);
    }

    if let Some(max) = max_len {
        if len > max {
            return Err(NormalizeError::TooLong { len, max });
        }
    }

    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collapses_whitespace_runs() {
        let result = normalize("The  quick\t\tbrown\n\nfox.", None).unwrap();
        assert_eq!(result, "The quick brown fox.");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let result = normalize("   hello world   ", None).unwrap();
        assert_eq!(result, "hello world");
    }

    #[test]
    fn strips_control_characters() {
        let result = normalize("hel\x00lo\x07 wor\x1Fld\x7F", None).unwrap();
        assert_eq!(result, "hello world");
    }

    #[test]
    fn strips_zero_width_characters() {
        let result = normalize("\u{FEFF}zero\u{200B}width\u{200D} text", None).unwrap();
        assert_eq!(result, "zerowidth text");
    }

    #[test]
    fn crlf_becomes_single_space() {
        let result = normalize("line one\r\nline two", None).unwrap();
        assert_eq!(result, "line one line two");
    }

    #[test]
    fn preserves_unicode_text() {
        let result = normalize("naïve “quotes” — café", None).unwrap();
        assert_eq!(result, "naïve “quotes” — café");
    }

    #[test]
    fn idempotent_on_accepted_output() {
        let inputs = [
            "The  quick\t\tbrown\n\nfox.",
            "  plain text  ",
            "naïve “quotes” line\r\nbreak",
            "a\x00b\u{200B}c",
        ];
        for input in inputs {
            let once = normalize(input, None).unwrap();
            let twice = normalize(&once, None).unwrap();
            assert_eq!(once, twice, "normalize not idempotent for {input:?}");
        }
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(normalize("", None), Err(NormalizeError::Empty));
        assert_eq!(normalize("   ", None), Err(NormalizeError::Empty));
        assert_eq!(normalize("\t\r\n", None), Err(NormalizeError::Empty));
    }

    #[test]
    fn rejects_input_that_cleans_to_nothing() {
        assert_eq!(
            normalize("\x00\x01\u{200B}\u{FEFF}", None),
            Err(NormalizeError::Empty)
        );
    }

    #[test]
    fn rejects_text_over_the_limit() {
        let text = "a".repeat(51);
        assert_eq!(
            normalize(&text, Some(50)),
            Err(NormalizeError::TooLong { len: 51, max: 50 })
        );
        assert!(normalize(&text, Some(51)).is_ok());
    }

    #[test]
    fn limit_applies_to_cleaned_length() {
        // 60 chars of text plus padding that collapses away.
        let text = format!("   {}   ", "b".repeat(60));
        assert!(normalize(&text, Some(60)).is_ok());
    }

    #[test]
    fn rejects_mostly_invalid_input() {
        let text = format!("{}hi", "\x00".repeat(150));
        assert_eq!(
            normalize(&text, None),
            Err(NormalizeError::TooManyInvalidChars)
        );
    }

    #[test]
    fn short_inputs_skip_the_survival_check() {
        // 3 of 12 characters survive, but the input is under 100 chars.
        let result = normalize("abc\x00\x01\x02\x03\x04\x05\x06\x07\x08", None).unwrap();
        assert_eq!(result, "abc");
    }

    #[test]
    fn survival_check_counts_characters_not_bytes() {
        // Multibyte text loses nothing; byte-based counting would misfire.
        let text = "é".repeat(150);
        let result = normalize(&text, None).unwrap();
        assert_eq!(result, text);
    }
}
