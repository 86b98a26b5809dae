//! Clickable terminal links (OSC 8).

use std::env;

/// Terms in `TERM` that usually mean the emulator understands OSC sequences.
const LINK_CAPABLE_TERMS: [&str; 7] = ["xterm", "screen", "tmux", "rxvt", "vt100", "linux", "konsole"];

/// Answers whether the current terminal renders hyperlinks.
pub(crate) trait LinkCapability {
    fn supports_links(&self) -> bool;
}

/// Reads one environment variable.
type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

/// Guesses hyperlink support from the environment variables terminals set.
///
/// The guess can be wrong both ways. When it is unsure it says no.
pub(crate) struct EnvLinkCapability {
    lookup: EnvLookup,
}

impl EnvLinkCapability {
    /// Reads the real process environment.
    pub(crate) fn new() -> Self {
        Self {
            lookup: Box::new(|key: &str| env::var(key).ok()),
        }
    }

    /// Reads variables through `lookup` instead of the process environment.
    #[cfg(test)]
    pub(crate) fn with_lookup(lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.is_empty())
    }
}

impl LinkCapability for EnvLinkCapability {
    fn supports_links(&self) -> bool {
        if cfg!(windows) && self.var("WT_SESSION").is_some() {
            return true;
        }

        if let Some(program) = self.var("TERM_PROGRAM") {
            if program.contains("iTerm") || program.contains("Apple_Terminal") {
                return true;
            }
        }

        if let Some(term) = self.var("TERM") {
            let term = term.to_lowercase();
            if LINK_CAPABLE_TERMS.iter().any(|known| term.contains(known)) {
                return true;
            }
        }

        self.var("COLORTERM").is_some()
    }
}

/// Wraps `text` in an OSC 8 hyperlink to `url`.
///
/// Returns whichever of the two is non-empty when the other is empty.
pub(crate) fn format_terminal_link(text: &str, url: &str) -> String {
    if text.is_empty() || url.is_empty() {
        return if text.is_empty() { url } else { text }.to_string();
    }

    format!("\x1b]8;;{url}\x1b\\{text}\x1b]8;;\x1b\\")
}

/// Renders a link for display, as a hyperlink when supported and as `text (url)` otherwise.
pub(crate) fn render_link(capability: &dyn LinkCapability, text: &str, url: &str) -> String {
    if capability.supports_links() {
        format_terminal_link(text, url)
    } else if url.is_empty() {
        text.to_string()
    } else {
        format!("{text} ({url})")
    }
}
