use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Maximum number of characters in a definition preview.
pub const PREVIEW_MAX_CHARS: usize = 150;

/// Characters escaped when a slug is placed in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Uppercase form of the first alphabetic character in `word`.
///
/// Returns `None` when the word contains no alphabetic character.
pub fn first_letter(word: &str) -> Option<String> {
    word.chars()
        .find(|c| c.is_alphabetic())
        .map(|c| c.to_uppercase().collect())
}

/// Build a URL-safe slug: lowercase, runs of anything that is not a
/// letter or digit collapsed to a single `-`, no leading/trailing `-`.
pub fn slugify(word: &str) -> String {
    let mut slug = String::with_capacity(word.len());
    let mut pending_dash = false;

    for c in word.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Slug for a headword, with the homonym number appended when present.
pub fn term_slug(word: &str, homonym_number: Option<u8>) -> String {
    let base = slugify(word);
    match homonym_number {
        Some(n) => format!("{base}-{n}"),
        None => base,
    }
}

/// First [`PREVIEW_MAX_CHARS`] characters of a definition.
pub fn definition_preview(text: &str) -> String {
    text.chars().take(PREVIEW_MAX_CHARS).collect()
}

/// Public URL of an entry page.
pub fn entry_url(base_url: &str, slug: &str) -> String {
    format!(
        "{}/dictionary/{}/",
        base_url.trim_end_matches('/'),
        utf8_percent_encode(slug, PATH_SEGMENT)
    )
}
