//! Escaping for free text embedded in a quoted, templated request.
//!
//! Event content (prompts, responses, detector details) is attacker
//! controlled. Before it is placed between double quotes in a structured
//! query or instruction template it must not be able to close the quote or
//! start a new line.

/// Escape `text` for embedding between double quotes.
///
/// Backslashes are doubled first, then double quotes are escaped. Carriage
/// returns, newlines and tabs each become a single space.
pub fn escape_template_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' | '\r' | '\t' => out.push(' '),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader side of the quoting rules, as the query parser applies them.
    fn unescape(text: &str) -> String {
        let mut out = String::new();
        let mut chars = text.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(ch);
            }
        }
        out
    }

    /// True when no unescaped double quote appears in `text`
    fn quote_is_closed_only_by_us(text: &str) -> bool {
        let mut escaped = false;
        for ch in text.chars() {
            match (escaped, ch) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => return false,
                _ => {}
            }
        }
        !escaped
    }

    const INJECTIONS: &[&str] = &[
        r#"" | delete index=main | eval x=""#,
        "line one\nline two\r\nline three",
        "tab\tseparated\tvalues",
        r"C:\temp\new",
        r#"trailing backslash \"#,
        r#"\" already escaped \\ looking"#,
    ];

    #[test]
    fn test_basic_rules() {
        assert_eq!(escape_template_text(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_template_text(r"a\b"), r"a\\b");
        assert_eq!(escape_template_text("a\nb\tc\rd"), "a b c d");
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = "Prompt anomaly score 0.91 for support-bot";
        assert_eq!(escape_template_text(text), text);
        assert_eq!(escape_template_text(&escape_template_text(text)), text);
    }

    #[test]
    fn test_injection_strings_stay_inside_quotes() {
        for input in INJECTIONS {
            let escaped = escape_template_text(input);
            assert!(!escaped.contains('\n'), "newline survived in {:?}", escaped);
            assert!(!escaped.contains('\t'), "tab survived in {:?}", escaped);
            assert!(!escaped.contains('\r'), "carriage return survived in {:?}", escaped);
            assert!(quote_is_closed_only_by_us(&escaped), "quote escaped from {:?}", escaped);
        }
    }

    #[test]
    fn test_round_trip_recovers_normalized_text() {
        for input in INJECTIONS {
            let normalized = input.replace(['\n', '\r', '\t'], " ");
            assert_eq!(unescape(&escape_template_text(input)), normalized);
        }
    }

    #[test]
    fn test_double_escape_is_consistent() {
        // Escaping already-escaped text escapes the escapes and nothing else,
        // so one unescape pass lands exactly on the first escape.
        for input in INJECTIONS {
            let once = escape_template_text(input);
            let twice = escape_template_text(&once);
            assert_eq!(unescape(&twice), once);
            assert!(quote_is_closed_only_by_us(&twice));
        }
    }
}
