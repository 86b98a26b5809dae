use std::collections::HashSet;
use std::fs::read_to_string;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum CatalogError {
    #[error("Failed to read catalog {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse catalog {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One curated listing in a catalog file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct CatalogEntry {
    /// The number users type to select the entry. Entries without a usable id can't be selected.
    #[serde(default, deserialize_with = "lenient_id")]
    pub(crate) id: Option<u32>,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) path: Option<String>,
}

impl CatalogEntry {
    /// The listing URL: `href` when set, otherwise `path`.
    pub(crate) fn listing_url(&self) -> Option<&str> {
        let href = self.href.trim();
        if !href.is_empty() {
            return Some(href);
        }

        self.path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
    }
}

/// Accepts ids written as numbers or numeric strings. Anything else becomes `None`.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number.as_u64().and_then(|id| u32::try_from(id).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

/// A named list of curated listings loaded from a JSON array.
#[derive(Debug, Clone)]
pub(crate) struct Catalog {
    name: String,
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub(crate) fn new(name: &str, entries: Vec<CatalogEntry>) -> Self {
        Self {
            name: name.to_string(),
            entries,
        }
    }

    /// Loads the catalog file at `path`.
    pub(crate) fn load(name: &str, path: &Path) -> Result<Self, CatalogError> {
        let contents = read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<CatalogEntry> =
            serde_json::from_str(&contents).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        trace!("Loaded {} entries from catalog \"{}\"", entries.len(), name);
        Ok(Self::new(name, entries))
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }
}

/// One comma separated part of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionPart {
    Id(u32),
    Range(u32, u32),
}

impl SelectionPart {
    fn parse(part: &str) -> Option<Self> {
        match part.split_once('-') {
            Some((start, end)) => {
                let start = start.trim().parse::<u32>().ok()?;
                let end = end.trim().parse::<u32>().ok()?;
                Some(if start > end {
                    SelectionPart::Range(end, start)
                } else {
                    SelectionPart::Range(start, end)
                })
            }
            None => part.parse().ok().map(SelectionPart::Id),
        }
    }
}

/// Parses a selection such as `all`, `1`, `1,3,5` or `2-4`.
///
/// Returns the selected entries in the order they were first named, and the single ids
/// no entry has. A range picks the entries whose id falls inside it, lowest id first, and
/// never reports gaps as missing. Parts that are not numbers or ranges are ignored.
pub(crate) fn parse_selection<'a>(
    selection: &str,
    entries: &'a [CatalogEntry],
) -> (Vec<&'a CatalogEntry>, Vec<u32>) {
    let selection = selection.trim().to_lowercase();
    if selection.is_empty() {
        return (Vec::new(), Vec::new());
    }
    if selection == "all" || selection == "a" {
        return (entries.iter().collect(), Vec::new());
    }

    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    let mut missing = Vec::new();
    for part in selection.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        match SelectionPart::parse(part) {
            Some(SelectionPart::Id(id)) => {
                if !seen.insert(id) {
                    continue;
                }
                match entries.iter().find(|entry| entry.id == Some(id)) {
                    Some(entry) => selected.push(entry),
                    None => missing.push(id),
                }
            }
            Some(SelectionPart::Range(start, end)) => {
                let mut in_range: Vec<(u32, &CatalogEntry)> = entries
                    .iter()
                    .filter_map(|entry| entry.id.map(|id| (id, entry)))
                    .filter(|(id, _)| (start..=end).contains(id))
                    .collect();
                in_range.sort_by_key(|(id, _)| *id);
                for (id, entry) in in_range {
                    if seen.insert(id) {
                        selected.push(entry);
                    }
                }
            }
            None => debug!("Ignoring selection part \"{}\"", part),
        }
    }

    (selected, missing)
}
