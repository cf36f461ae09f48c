//! Filename sanitization for downloaded media.
//!
//! Titles come straight from remote catalogs, so they may contain characters
//! that are invalid on Windows, Linux, or macOS. Valid Unicode text (CJK,
//! accents, emoji) is kept.

/// Characters that are invalid in Windows filenames
const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Maximum number of characters kept from a title in a download filename.
pub const MAX_TITLE_CHARS: usize = 90;

/// Sanitize a string for use in filenames across all platforms.
///
/// Control characters and Windows-invalid characters become `_` (runs are
/// collapsed), leading/trailing spaces and dots are trimmed, reserved device
/// names get a `_` prefix, and an empty result becomes `"unnamed"`.
///
/// ```
/// use whirlpool_engine::utils::filename::sanitize_filename;
///
/// assert_eq!(sanitize_filename("hello?world"), "hello_world");
/// assert_eq!(sanitize_filename(""), "unnamed");
/// assert_eq!(sanitize_filename("CON"), "_CON");
/// ```
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || WINDOWS_INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let upper = trimmed.to_uppercase();
    let reserved = WINDOWS_RESERVED_NAMES
        .iter()
        .any(|name| upper == *name || upper.starts_with(&format!("{name}.")));
    if reserved {
        return format!("_{trimmed}");
    }

    trimmed.to_string()
}

/// Build the filename stem for a downloaded item from its title.
///
/// The title is sanitized, cut to [`MAX_TITLE_CHARS`] characters and has `%`
/// doubled so it is taken literally inside an extractor output template.
pub fn download_stem(title: &str) -> String {
    let sanitized = sanitize_filename(title);
    let truncated: String = sanitized.chars().take(MAX_TITLE_CHARS).collect();
    let truncated = truncated.trim_end_matches([' ', '.']);
    let stem = if truncated.is_empty() {
        "unnamed"
    } else {
        truncated
    };
    stem.replace('%', "%%")
}
