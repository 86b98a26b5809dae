use std::borrow::Cow;

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

/// Name used when a listing URL has no path to name the download after.
pub(crate) const FALLBACK_PROJECT_NAME: &str = "download";

// A constant selector always parses.
static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("a[href] is a valid selector"));

/// Returns the `href` of every anchor on the page, in document order.
///
/// Values are returned untouched, empty ones included.
pub(crate) fn extract_hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let hrefs = document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::to_string)
        .collect();
    hrefs
}

/// Percent-decodes `value`. Invalid UTF-8 in the decoded bytes is replaced rather than rejected.
pub(crate) fn percent_decode(value: &str) -> String {
    match urlencoding::decode(value) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => match urlencoding::decode_binary(value.as_bytes()) {
            Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Cow::Owned(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        },
    }
}

/// Derives a folder name from a listing URL: its last non-empty path segment, decoded.
///
/// `http://host/music/Live%20Sets/` gives `Live Sets`. A URL without a path gives
/// [FALLBACK_PROJECT_NAME].
pub(crate) fn project_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let path = after_scheme.split_once('/').map(|(_, path)| path).unwrap_or("");

    path.split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .map(percent_decode)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_PROJECT_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const APACHE_LISTING: &str = r#"<!DOCTYPE HTML PUBLIC "-//W3C//DTD HTML 3.2 Final//EN">
<html>
 <head><title>Index of /music</title></head>
 <body>
<h1>Index of /music</h1>
<pre><a href="?C=N;O=D">Name</a> <a href="?C=M;O=A">Last modified</a> <a href="?C=S;O=A">Size</a>
<hr><a href="/">Parent Directory</a>
<a href="Live%20Sets/">Live Sets/</a>
<a href="song.mp3">song.mp3</a>
<a href="cover.jpg">cover.jpg</a>
<a href="track%202.wav">track 2.wav</a>
<a name="no-href">anchor</a>
<hr></pre>
</body></html>"#;

    #[test]
    fn test_extract_hrefs_keeps_document_order() {
        let hrefs = extract_hrefs(APACHE_LISTING);
        assert_eq!(
            hrefs,
            vec![
                "?C=N;O=D",
                "?C=M;O=A",
                "?C=S;O=A",
                "/",
                "Live%20Sets/",
                "song.mp3",
                "cover.jpg",
                "track%202.wav",
            ]
        );
    }

    #[test]
    fn test_extract_hrefs_keeps_empty_values() {
        let hrefs = extract_hrefs(r#"<a href="">x</a><a href="a.flac">a</a>"#);
        assert_eq!(hrefs, vec!["", "a.flac"]);
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("track%202.wav"), "track 2.wav");
        assert_eq!(percent_decode("plain.mp3"), "plain.mp3");
        assert_eq!(percent_decode("bad%FFbyte.mp3"), "bad\u{FFFD}byte.mp3");
    }

    #[test]
    fn test_project_name() {
        assert_eq!(project_name("http://example.com/music/Live%20Sets/"), "Live Sets");
        assert_eq!(project_name("http://example.com/music/albums"), "albums");
        assert_eq!(project_name("http://example.com/music/?C=N;O=A"), "music");
        assert_eq!(project_name("http://example.com/"), FALLBACK_PROJECT_NAME);
        assert_eq!(project_name("http://example.com"), FALLBACK_PROJECT_NAME);
    }
}
