//! Deterministic slug derivation from post titles.
//!
//! The algorithm is intentionally conservative so that slugs stored by
//! earlier releases keep resolving: lower-case, spaces to hyphens,
//! diacritics stripped through canonical decomposition, a fixed reserved
//! character set removed, then truncation to a code-point budget.

use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Default code-point budget for generated slugs.
pub const DEFAULT_SLUG_MAX_LENGTH: usize = 50;

/// Characters never allowed to survive into a slug. URL-reserved plus a few
/// that break common permalink routers.
const RESERVED_CHARACTERS: &[char] = &[
    '!', '#', '$', '&', '\'', '(', ')', '*', ',', '/', ':', ';', '=', '?', '@', '[', ']', '"',
    '%', '.', '<', '>', '\\', '^', '_', '{', '}', '|', '~', '`', '+',
];

const SLUG_SUFFIX_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month padding:zero][day padding:zero][hour padding:zero][minute padding:zero]");

/// Derive a URL-safe slug from a human-readable title.
///
/// Pure and total: any input (including the empty string) produces a
/// result, and re-slugging a slug returns it unchanged.
pub fn create_slug(title: &str, max_length: usize) -> String {
    let hyphenated = title.to_lowercase().replace(' ', "-");
    let stripped = remove_diacritics(&hyphenated);
    let cleaned: String = stripped
        .chars()
        .filter(|ch| !RESERVED_CHARACTERS.contains(ch))
        .collect();
    let truncated: String = cleaned.chars().take(max_length).collect();
    truncated.to_lowercase()
}

/// [`create_slug`] with the default length budget.
pub fn create_slug_default(title: &str) -> String {
    create_slug(title, DEFAULT_SLUG_MAX_LENGTH)
}

/// Render the `YYYYMMDDHHMM` suffix appended to a title when a slug
/// collides with one owned by another post.
pub fn timestamp_suffix(now: OffsetDateTime) -> String {
    now.format(SLUG_SUFFIX_FORMAT).expect("valid slug suffix")
}

/// Canonically decompose, drop combining marks, then re-compose. Turns
/// "Héllo" into "Hello" while leaving non-Latin scripts alone.
fn remove_diacritics(text: &str) -> String {
    text.nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .nfc()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn strips_diacritics_spaces_and_reserved_characters() {
        assert_eq!(create_slug("Héllo World!", 50), "hello-world");
    }

    #[test]
    fn create_slug_is_idempotent() {
        let once = create_slug("Crème Brûlée: a field guide?", 50);
        assert_eq!(create_slug(&once, 50), once);
    }

    #[test]
    fn respects_the_length_budget_in_code_points() {
        for max in [0, 1, 5, 50] {
            let slug = create_slug("a very long title that keeps going and going", max);
            assert!(slug.chars().count() <= max);
        }
    }

    #[test]
    fn empty_title_produces_empty_slug() {
        assert_eq!(create_slug_default(""), "");
    }

    #[test]
    fn removes_every_reserved_character() {
        let slug = create_slug("a!#$&'()*,/:;=?@[]\"%.<>\\^_{}|~`+b", 50);
        assert_eq!(slug, "ab");
    }

    #[test]
    fn timestamp_suffix_is_twelve_digits() {
        let suffix = timestamp_suffix(datetime!(2026-02-03 04:05:06 UTC));
        assert_eq!(suffix, "202602030405");
    }
}
