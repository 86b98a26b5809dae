use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::index_of::listing::FALLBACK_PROJECT_NAME;

/// Replaces characters that are not allowed in file names on common platforms.
pub(crate) fn remove_invalid_chars(text: &str) -> String {
    text.chars()
        .map(|e| match e {
            '?' | ':' | '*' | '<' | '>' | '"' | '|' => '_',
            c if c.is_control() => '_',
            _ => e,
        })
        .collect()
}

/// Turns a user supplied name or relative path into safe path components.
///
/// Separators split components, `.`/`..` and empty components are dropped.
fn sanitize_components(name: &str) -> Vec<String> {
    name.split(['/', '\\'])
        .map(|component| remove_invalid_chars(component.trim()))
        .filter(|component| !component.is_empty() && component != "." && component != "..")
        .collect()
}

/// The directory a listing is saved to: `root` joined with the sanitized `name`.
pub(crate) fn output_directory(root: &Path, name: &str) -> PathBuf {
    let components = sanitize_components(name);
    if components.is_empty() {
        return root.join(FALLBACK_PROJECT_NAME);
    }

    components
        .iter()
        .fold(root.to_path_buf(), |path, component| path.join(component))
}

/// Creates `dir` and any missing parents.
pub(crate) fn create_output_directory(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory at {}", dir.display()))?;
    trace!("Output directory ready: {}", dir.display());
    Ok(())
}
