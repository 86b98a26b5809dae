//! Separates real file links on a directory listing from the navigation noise around them.
//!
//! Listing pages expose sort toggles (`?C=N;O=A`), the parent directory (`../`) and
//! subdirectories as anchors next to the files themselves. Everything here is a pure
//! function of the href string.

use std::fmt;

/// Extensions treated as audio when no allow-list is configured.
pub(crate) const DEFAULT_AUDIO_EXTENSIONS: [&str; 6] =
    [".wav", ".mp3", ".mp4", ".m4a", ".aac", ".flac"];

/// What a single href on a listing page points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkKind {
    /// Sort links, anchors, scripts, mail links and directories. Never kept.
    Navigation,
    /// A file whose name ends with one of the allowed audio extensions.
    Audio,
    /// Any other file.
    Other,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Navigation => write!(f, "navigation"),
            LinkKind::Audio => write!(f, "audio"),
            LinkKind::Other => write!(f, "other"),
        }
    }
}

/// The allow-list of extensions that mark a link as audio.
///
/// Extensions are stored lowercased with a leading dot, so `"MP3"` and `".mp3"` are the same entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AudioExtensions {
    extensions: Vec<String>,
}

impl AudioExtensions {
    /// Builds an allow-list from the given extensions, normalizing each one.
    ///
    /// Blank entries are dropped.
    pub(crate) fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for ext in extensions {
            let ext = ext.as_ref().trim().to_lowercase();
            if ext.is_empty() || ext == "." {
                continue;
            }
            let ext = if ext.starts_with('.') { ext } else { format!(".{ext}") };
            if !normalized.contains(&ext) {
                normalized.push(ext);
            }
        }

        Self { extensions: normalized }
    }

    pub(crate) fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Returns true when the lowercased href ends with an allowed extension.
    pub(crate) fn matches(&self, href: &str) -> bool {
        let lowered = href.to_lowercase();
        self.extensions.iter().any(|ext| lowered.ends_with(ext.as_str()))
    }
}

impl Default for AudioExtensions {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIO_EXTENSIONS)
    }
}

/// Returns true for hrefs that are never files: empty values, script/mail/fragment links,
/// query-only links (sort toggles) and anything ending in `/`.
pub(crate) fn is_navigation_or_sort_link(href: &str) -> bool {
    let trimmed = href.trim();
    if trimmed.is_empty() {
        return true;
    }

    let lowered = trimmed.to_lowercase();
    if lowered.starts_with("javascript:") || lowered.starts_with("mailto:") || lowered.starts_with('#')
    {
        return true;
    }

    // Covers `?C=N;O=A` and any other query-only link.
    if lowered.starts_with('?') {
        return true;
    }

    trimmed.ends_with('/') || trimmed == "../" || trimmed == "./"
}

/// Classifies a single href.
pub(crate) fn classify(href: &str, extensions: &AudioExtensions) -> LinkKind {
    if is_navigation_or_sort_link(href) {
        LinkKind::Navigation
    } else if extensions.matches(href) {
        LinkKind::Audio
    } else {
        LinkKind::Other
    }
}

/// Drops navigation links and keeps every other href in its original order.
pub(crate) fn filter_links<S: AsRef<str>>(hrefs: &[S]) -> Vec<String> {
    hrefs
        .iter()
        .map(|href| href.as_ref())
        .filter(|href| !is_navigation_or_sort_link(href))
        .map(str::to_string)
        .collect()
}

/// Counts entries whose name ends with an allowed audio extension.
pub(crate) fn count_audio<S: AsRef<str>>(hrefs: &[S], extensions: &AudioExtensions) -> usize {
    hrefs.iter().filter(|href| extensions.matches(href.as_ref())).count()
}

/// The audio subset of an already filtered link set, in order.
pub(crate) fn audio_links<'a, S: AsRef<str>>(
    filtered: &'a [S],
    extensions: &AudioExtensions,
) -> Vec<&'a str> {
    filtered
        .iter()
        .map(|href| href.as_ref())
        .filter(|href| classify(href, extensions) == LinkKind::Audio)
        .collect()
}
