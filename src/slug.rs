use std::sync::LazyLock;

use regex::Regex;

pub const DEFAULT_SLUG_LEN: usize = 120;
pub const FALLBACK_SLUG: &str = "untitled";

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("static slug pattern"));

/// Turns a title into an ASCII file stem.
///
/// Every run of characters outside `[A-Za-z0-9]` collapses to one `_`, edge
/// separators are stripped, and the result is cut to `max_len` bytes. Titles
/// with nothing usable map to [`FALLBACK_SLUG`].
pub fn slugify(title: &str, max_len: usize) -> String {
    let replaced = NON_ALNUM.replace_all(title, "_");
    let trimmed = replaced.trim_matches('_');
    // only ASCII survives the replacement, so byte slicing is safe
    let cut = &trimmed[..trimmed.len().min(max_len)];
    if cut.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        cut.to_string()
    }
}
