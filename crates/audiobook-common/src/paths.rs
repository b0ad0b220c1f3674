//! Path utilities for detecting audio files and naming outputs.
//!
//! The scanner uses [`is_audio_file`] to pick candidates out of a source
//! tree, and the conversion policy uses [`sanitize_filename`] to derive the
//! output file name from the source file stem.

use std::path::Path;

/// List of supported audio file extensions.
const AUDIO_EXTENSIONS: &[&str] = &[
    "m4b", "mp3", "aac", "m4a", "flac", "ogg", "wma", "wav", "webma", "opus",
];

/// Name used when sanitization leaves nothing behind.
const EMPTY_NAME_FALLBACK: &str = "untitled";

/// Centre dot, kept for transliterated titles.
const MIDDLE_DOT: char = '\u{00B7}';

/// Check if a path has a supported audio file extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use audiobook_common::paths::is_audio_file;
///
/// assert!(is_audio_file(Path::new("book.m4b")));
/// assert!(is_audio_file(Path::new("/library/Author/Book/01.MP3")));
/// assert!(!is_audio_file(Path::new("cover.jpg")));
/// ```
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Get the list of supported audio file extensions (without the dot).
///
/// # Examples
///
/// ```
/// use audiobook_common::paths::audio_extensions;
///
/// let extensions = audio_extensions();
/// assert!(extensions.contains(&"m4b"));
/// assert!(extensions.contains(&"opus"));
/// ```
#[must_use]
pub fn audio_extensions() -> &'static [&'static str] {
    AUDIO_EXTENSIONS
}

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '~' | ' ' | '-') || c == MIDDLE_DOT
}

/// Sanitize a file name (without extension) for use as an output name.
///
/// Every character outside `[A-Za-z0-9_.~ -]` and the centre dot (U+00B7)
/// becomes `-`, runs of `-` collapse into one, leading whitespace and
/// trailing dots/whitespace are stripped. A name that ends up empty becomes
/// `untitled`.
///
/// The function is idempotent: sanitizing an already sanitized name returns
/// it unchanged.
///
/// # Examples
///
/// ```
/// use audiobook_common::paths::sanitize_filename;
///
/// assert_eq!(sanitize_filename("Chapter 1: Arrival?"), "Chapter 1- Arrival-");
/// assert_eq!(sanitize_filename("Tao Te Ching \u{00B7} Laozi"), "Tao Te Ching \u{00B7} Laozi");
/// assert_eq!(sanitize_filename("Vol. 2..."), "Vol. 2");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());

    for c in name.chars() {
        let c = if is_allowed_char(c) { c } else { '-' };
        if c == '-' && sanitized.ends_with('-') {
            continue;
        }
        sanitized.push(c);
    }

    let trimmed = sanitized
        .trim_start()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    if trimmed.is_empty() {
        EMPTY_NAME_FALLBACK.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_audio_file() {
        for ext in AUDIO_EXTENSIONS {
            let name = format!("book.{ext}");
            assert!(is_audio_file(Path::new(&name)), "{name}");
        }

        // Case insensitive
        assert!(is_audio_file(Path::new("book.M4B")));
        assert!(is_audio_file(Path::new("book.Flac")));

        // With paths
        assert!(is_audio_file(Path::new("/library/author/book.mp3")));
        assert!(is_audio_file(Path::new("relative/path/book.opus")));

        // Not audio files
        assert!(!is_audio_file(Path::new("cover.jpg")));
        assert!(!is_audio_file(Path::new("notes.txt")));
        assert!(!is_audio_file(Path::new("movie.mkv")));
        assert!(!is_audio_file(Path::new("no_extension")));
        assert!(!is_audio_file(Path::new("")));
    }

    #[test]
    fn test_audio_extensions() {
        let exts = audio_extensions();
        assert_eq!(exts.len(), 10);
        assert!(exts.contains(&"webma"));
        assert!(exts.contains(&"wma"));
    }

    #[test]
    fn test_sanitize_keeps_valid_names() {
        assert_eq!(sanitize_filename("Book 01"), "Book 01");
        assert_eq!(sanitize_filename("a_b.c~d-e"), "a_b.c~d-e");
    }

    #[test]
    fn test_sanitize_replaces_and_collapses() {
        assert_eq!(sanitize_filename("a/b\\c"), "a-b-c");
        assert_eq!(sanitize_filename("what?!*"), "what-");
        assert_eq!(sanitize_filename("a--b"), "a-b");
        assert_eq!(sanitize_filename("a?-?b"), "a-b");
        assert_eq!(sanitize_filename("Café"), "Caf-");
        assert_eq!(sanitize_filename("日本語タイトル"), "-");
    }

    #[test]
    fn test_sanitize_keeps_middle_dot() {
        assert_eq!(sanitize_filename("A\u{00B7}B"), "A\u{00B7}B");
        assert_eq!(sanitize_filename("A \u{00B7}\u{00B7} B"), "A \u{00B7}\u{00B7} B");
    }

    #[test]
    fn test_sanitize_trims() {
        assert_eq!(sanitize_filename("  Book  "), "Book");
        assert_eq!(sanitize_filename("Book..."), "Book");
        assert_eq!(sanitize_filename("Book. . ."), "Book");
        assert_eq!(sanitize_filename("..."), EMPTY_NAME_FALLBACK);
        assert_eq!(sanitize_filename(""), EMPTY_NAME_FALLBACK);
    }

    #[test]
    fn test_sanitize_idempotent() {
        let inputs = [
            "Chapter 1: Arrival?",
            "a?-?b",
            "  spaced out . ",
            "...",
            "--lead",
            "trail--",
            "mixed\u{00B7}dots\u{2022}bullets",
            "Ünïcödé & <stuff>",
            "a -.- b",
        ];
        for input in inputs {
            let once = sanitize_filename(input);
            assert_eq!(sanitize_filename(&once), once, "input: {input:?}");
        }
    }
}
