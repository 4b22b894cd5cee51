//! Class-name normalization and the bounded class-count validator.
//!
//! The canonical name is used both to create a group's category and to look
//! an existing group up by name, so normalization must be a pure function of
//! the input.

use regex::Regex;

/// Canonical identifier for a class.
///
/// Collects the alphabetic characters (lower-cased) and the ASCII digits of
/// the input, joined by `-`. Everything else is dropped, so `"CS 1026"`,
/// `"cs1026"` and `"Cs-1026"` all map to `"cs-1026"`. Empty input maps to
/// `"-"` rather than an error.
pub fn canonical_class_name(input: &str) -> String {
    let mut letters = String::new();
    let mut digits = String::new();

    for ch in input.chars() {
        if ch.is_alphabetic() {
            letters.extend(ch.to_lowercase());
        } else if ch.is_ascii_digit() {
            digits.push(ch);
        }
    }

    format!("{letters}-{digits}")
}

/// Whether a category name looks like a canonical class identifier.
///
/// Used by the command layer to recognize class-group categories before
/// acting on them.
pub fn is_canonical_class_name(name: &str) -> bool {
    let re = Regex::new(r"^[a-z]+-[0-9]+$").expect("valid regex");
    re.is_match(name)
}

/// Parse a user-supplied class count.
///
/// Valid iff the trimmed input parses as an integer in `0..10`. `0` is a
/// valid answer and short-circuits the enrollment dialogue.
pub fn parse_class_count(input: &str) -> Option<u8> {
    let n = input.trim().parse::<i64>().ok()?;
    if (0..10).contains(&n) {
        return Some(n as u8);
    }
    None
}

/// Boolean form of [`parse_class_count`]. Never panics.
pub fn is_valid_class_count(input: &str) -> bool {
    parse_class_count(input).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_letter_digit_runs() {
        assert_eq!(canonical_class_name("CS1026"), "cs-1026");
        assert_eq!(canonical_class_name("cs1026"), "cs-1026");
        assert_eq!(canonical_class_name("Calc1000"), "calc-1000");
    }

    #[test]
    fn normalization_ignores_case_and_separators() {
        assert_eq!(canonical_class_name("CS 1026"), "cs-1026");
        assert_eq!(canonical_class_name("cs-1026"), "cs-1026");
        assert_eq!(
            canonical_class_name("CS 1026"),
            canonical_class_name("cS1026")
        );
    }

    #[test]
    fn normalizes_empty_input_to_bare_separator() {
        assert_eq!(canonical_class_name(""), "-");
        assert_eq!(canonical_class_name("  "), "-");
    }

    #[test]
    fn canonical_name_check() {
        assert!(is_canonical_class_name("cs-1026"));
        assert!(is_canonical_class_name("calc-1000"));
        assert!(!is_canonical_class_name("general"));
        assert!(!is_canonical_class_name("CS-1026"));
        assert!(!is_canonical_class_name("-1026"));
        assert!(!is_canonical_class_name("cs-"));
    }

    #[test]
    fn accepts_single_digit_counts() {
        for n in 0..10 {
            assert!(is_valid_class_count(&n.to_string()), "{n} should be valid");
        }
        assert_eq!(parse_class_count(" 3 "), Some(3));
    }

    #[test]
    fn rejects_out_of_range_and_non_numeric() {
        assert!(!is_valid_class_count("10"));
        assert!(!is_valid_class_count("-1"));
        assert!(!is_valid_class_count("abc"));
        assert!(!is_valid_class_count("3.5"));
        assert!(!is_valid_class_count(""));
    }
}
