//! Channel extractor argument strings.
//!
//! Channels declare extra extractor arguments as one shell-like string, e.g.
//! `yt-dlp --referer "https://example.org/" -f best`. The leading program
//! name is optional and ignored.

/// Split a shell-like argument string into words.
///
/// Supports single quotes (literal), double quotes (with `\"` and `\\`
/// escapes) and backslash escapes outside quotes. An unterminated quote runs
/// to the end of the input.
pub fn split_args(input: &str) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Quote::None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (Quote::None, '\'') => {
                quote = Quote::Single;
                in_word = true;
            }
            (Quote::None, '"') => {
                quote = Quote::Double;
                in_word = true;
            }
            (Quote::None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_word = true;
            }
            (Quote::Single, '\'') | (Quote::Double, '"') => quote = Quote::None,
            (Quote::Double, '\\') => match chars.peek() {
                Some(&next) if next == '"' || next == '\\' => {
                    current.push(next);
                    chars.next();
                }
                _ => current.push('\\'),
            },
            (_, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// Extra arguments declared by a channel, without the program name.
pub fn extractor_args(declared: &str) -> Vec<String> {
    let mut words = split_args(declared);
    if words
        .first()
        .is_some_and(|w| matches!(w.as_str(), "yt-dlp" | "yt_dlp" | "youtube-dl"))
    {
        words.remove(0);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_words() {
        assert_eq!(split_args("  -f  best "), vec!["-f", "best"]);
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn test_quotes() {
        assert_eq!(
            split_args(r#"--referer "https://a b/" --add-header 'X: "1"'"#),
            vec!["--referer", "https://a b/", "--add-header", r#"X: "1""#]
        );
        assert_eq!(split_args(r#"a\ b "c\"d" ''"#), vec!["a b", "c\"d", ""]);
    }

    #[test]
    fn test_program_name_is_dropped() {
        assert_eq!(
            extractor_args("yt-dlp --impersonate chrome"),
            vec!["--impersonate", "chrome"]
        );
        assert_eq!(extractor_args("-f 18"), vec!["-f", "18"]);
    }
}
