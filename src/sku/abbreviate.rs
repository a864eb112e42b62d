//! Abbreviation rules shared by the name prefix and the category segments.

/// Prefix used when a product name has no words at all.
pub const FALLBACK_PREFIX: &str = "PRD";

/// Maximum number of name words that contribute to the prefix.
pub const NAME_PREFIX_WORDS: usize = 3;

const WORD_HEAD_CHARS: usize = 3;

/// Abbreviate a category value.
///
/// One word yields its first three characters, several words yield the
/// initial of each word. Both are upper-cased.
pub fn abbreviate(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    match words.as_slice() {
        [] => String::new(),
        [word] => head(word, WORD_HEAD_CHARS),
        many => many.iter().map(|w| head(w, 1)).collect(),
    }
}

/// Build the name prefix: the first three words, each cut to three
/// characters, dash-joined. Falls back to [`FALLBACK_PREFIX`].
pub fn name_prefix(name: &str) -> String {
    let parts: Vec<String> = name
        .split_whitespace()
        .take(NAME_PREFIX_WORDS)
        .map(|w| head(w, WORD_HEAD_CHARS))
        .collect();

    if parts.is_empty() {
        FALLBACK_PREFIX.to_string()
    } else {
        parts.join("-")
    }
}

fn head(word: &str, chars: usize) -> String {
    word.chars().take(chars).collect::<String>().to_uppercase()
}
