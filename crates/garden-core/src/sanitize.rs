//! Free-text normalization applied before anything reaches storage.
//!
//! All functions are pure and bound their output, so oversized or hostile
//! input cannot grow rows without limit.

/// Truncate `text` to at most `max` bytes without splitting a character.
pub fn truncate_bytes(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

/// Normalize line endings, drop control characters other than `\n`/`\t`,
/// and cap the result at `max_bytes`.
pub fn sanitize_text(text: &str, max_bytes: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_bytes));
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if out.len() >= max_bytes {
            break;
        }
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    let _ = chars.next();
                }
                out.push('\n');
            }
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    truncate_bytes(&mut out, max_bytes);
    out
}

/// Sanitize to a single trimmed line of at most `max_chars` characters.
///
/// Whitespace runs (newlines included) collapse to one space.
pub fn sanitize_line(text: &str, max_chars: usize) -> String {
    let mut out = String::new();
    let mut count = 0;
    for word in text.split_whitespace() {
        let word: String = word.chars().filter(|c| !c.is_control()).collect();
        if word.is_empty() {
            continue;
        }
        if count > 0 {
            if count + 1 >= max_chars {
                break;
            }
            out.push(' ');
            count += 1;
        }
        for c in word.chars() {
            if count >= max_chars {
                break;
            }
            out.push(c);
            count += 1;
        }
        if count >= max_chars {
            break;
        }
    }
    out
}

/// Like [`sanitize_line`], but an empty result becomes `None`.
pub fn sanitize_optional_line(text: Option<&str>, max_chars: usize) -> Option<String> {
    text.map(|t| sanitize_line(t, max_chars))
        .filter(|t| !t.is_empty())
}

/// Model names are single-line and lowercase; empty means "no model".
pub fn sanitize_model(text: Option<&str>) -> Option<String> {
    sanitize_optional_line(text, MAX_MODEL_CHARS).map(|m| m.to_lowercase())
}

/// Upper bound for model names.
pub const MAX_MODEL_CHARS: usize = 128;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_normalizes_line_endings() {
        assert_eq!(sanitize_text("a\r\nb\rc\nd", 100), "a\nb\nc\nd");
    }

    #[test]
    fn text_drops_control_chars() {
        assert_eq!(sanitize_text("he\u{0}llo\u{7}\tworld", 100), "hello\tworld");
    }

    #[test]
    fn text_keeps_trailing_whitespace() {
        assert_eq!(sanitize_text("This is a ", 100), "This is a ");
    }

    #[test]
    fn text_is_capped_on_char_boundary() {
        let s = sanitize_text("héllo", 2);
        assert_eq!(s, "h");
        let s = sanitize_text("héllo", 3);
        assert_eq!(s, "hé");
    }

    #[test]
    fn line_collapses_whitespace() {
        assert_eq!(sanitize_line("  My \n\n  title\t here ", 100), "My title here");
    }

    #[test]
    fn line_is_capped_in_chars() {
        assert_eq!(sanitize_line("abcdef", 3), "abc");
        assert_eq!(sanitize_line("ab cd", 4), "ab c");
        assert_eq!(sanitize_line("ab cd", 3), "ab");
    }

    #[test]
    fn optional_line_empty_is_none() {
        assert_eq!(sanitize_optional_line(Some("   "), 10), None);
        assert_eq!(sanitize_optional_line(None, 10), None);
        assert_eq!(sanitize_optional_line(Some(" x "), 10).as_deref(), Some("x"));
    }

    #[test]
    fn model_is_lowercased() {
        assert_eq!(sanitize_model(Some(" GPT-4o ")).as_deref(), Some("gpt-4o"));
        assert_eq!(sanitize_model(Some("")), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn text_never_exceeds_cap(s in "\\PC*", cap in 0usize..64) {
                let out = sanitize_text(&s, cap);
                prop_assert!(out.len() <= cap);
                prop_assert!(!out.contains('\r'));
            }

            #[test]
            fn line_never_exceeds_cap(s in "\\PC*", cap in 0usize..32) {
                let out = sanitize_line(&s, cap);
                prop_assert!(out.chars().count() <= cap);
                prop_assert!(!out.contains('\n'));
                prop_assert_eq!(out.trim(), out.as_str());
            }
        }
    }
}
