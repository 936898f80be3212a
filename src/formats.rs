pub const EPUB_MIME_PREFIX: &str = "application/epub";

const NO_IMAGES_MARKER: &str = ".noimages";
const IMAGES_MARKER: &str = ".images";

/// Picks the preferred EPUB URL from `(content type, url)` pairs.
///
/// Preference is no-images, then plain, then images. Equal scores keep the
/// order the formats were listed in.
pub fn pick_best_epub<'a, I>(formats: I) -> Option<&'a str>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut candidates = formats
        .into_iter()
        .filter(|(mime, _)| mime.starts_with(EPUB_MIME_PREFIX))
        .map(|(_, url)| url)
        .collect::<Vec<_>>();
    candidates.sort_by_key(|url| epub_score(url));
    candidates.first().copied()
}

fn epub_score(url: &str) -> u8 {
    if url.contains(NO_IMAGES_MARKER) {
        0
    } else if url.contains(IMAGES_MARKER) {
        2
    } else {
        1
    }
}
