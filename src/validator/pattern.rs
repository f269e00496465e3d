//! Picture-clause text matching.
//!
//! A pattern is matched character-for-character against the text:
//!
//! - `#` matches one ASCII digit
//! - `X` matches one letter
//! - `@` matches one alphanumeric character
//! - `*` matches any one character
//! - everything else matches itself literally
//!
//! The lengths must agree; there is no repetition or wildcard run.

/// Whole-text match of `text` against the picture clause `pattern`.
pub(crate) fn matches(pattern: &str, text: &str) -> bool {
    let mut cs = text.chars();
    for p in pattern.chars() {
        let Some(c) = cs.next() else {
            return false;
        };
        let ok = match p {
            '#' => c.is_ascii_digit(),
            'X' => c.is_alphabetic(),
            '@' => c.is_alphanumeric(),
            '*' => true,
            literal => c == literal,
        };
        if !ok {
            return false;
        }
    }
    cs.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::matches;

    #[test]
    fn digit_letter_alnum_and_any_classes() {
        assert!(matches("###-##", "123-45"));
        assert!(!matches("###-##", "12a-45"));
        assert!(matches("XX@#", "abc3"));
        assert!(!matches("XX@#", "ab!3"));
        assert!(matches("**", "!?"));
    }

    #[test]
    fn literals_match_themselves() {
        assert!(matches("(###) ###", "(555) 123"));
        assert!(!matches("(###) ###", "[555] 123"));
    }

    #[test]
    fn lengths_must_agree() {
        assert!(!matches("###", "12"));
        assert!(!matches("###", "1234"));
        assert!(matches("", ""));
    }

    #[test]
    fn classes_are_unicode_aware_where_the_class_is() {
        // `X` is any letter, `#` is ASCII digits only.
        assert!(matches("XX", "äb"));
        assert!(!matches("#", "٣"));
    }
}
