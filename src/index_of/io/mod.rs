use std::fs::{create_dir_all, read_to_string, write};
use std::io;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::Duration;

use anyhow::{Context, Error};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::{from_str, to_string_pretty};

use crate::index_of::downloader::DEFAULT_CHUNK_SIZE;
use crate::index_of::filter::{AudioExtensions, DEFAULT_AUDIO_EXTENSIONS};
use crate::index_of::sender::DEFAULT_TIMEOUT_SECS;

pub(crate) mod catalog;
pub(crate) mod directory;

/// Name of the configuration file.
pub(crate) const CONFIG_NAME: &str = "config.json";

/// Catalog written on first run so the menu has something to show.
const CATALOG_FILE_EXAMPLE: &str = r#"[
  {
    "id": 1,
    "name": "Example Collection",
    "href": "https://example.com/music/"
  }
]
"#;

/// A curated category shown in the menu, backed by a JSON catalog file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct CatalogSource {
    /// The label shown in the menu.
    pub(crate) name: String,
    /// Path to the JSON file holding the entries.
    pub(crate) file: String,
}

/// Config that is used to do general setup.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct Config {
    /// Root directory every download folder is created under.
    #[serde(rename = "downloadDirectory", default = "default_download_directory")]
    download_directory: String,
    /// Bytes requested per read while streaming.
    #[serde(rename = "chunkSize", default = "default_chunk_size")]
    chunk_size: usize,
    /// Timeout for each request in seconds.
    #[serde(rename = "requestTimeoutSecs", default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    /// Extensions that mark a link as audio.
    #[serde(rename = "audioExtensions", default = "default_audio_extensions")]
    audio_extensions: Vec<String>,
    /// Curated categories for the menu.
    #[serde(default = "default_catalogs")]
    catalogs: Vec<CatalogSource>,
}

fn default_download_directory() -> String { String::from("output") }
fn default_chunk_size() -> usize { DEFAULT_CHUNK_SIZE }
fn default_request_timeout_secs() -> u64 { DEFAULT_TIMEOUT_SECS }
fn default_audio_extensions() -> Vec<String> {
    DEFAULT_AUDIO_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}
fn default_catalogs() -> Vec<CatalogSource> {
    vec![CatalogSource {
        name: String::from("Stars"),
        file: String::from("catalogs/stars.json"),
    }]
}

static CONFIG: OnceCell<Config> = OnceCell::new();

impl Config {
    /// Root directory every download folder is created under.
    pub(crate) fn download_directory(&self) -> &Path {
        Path::new(&self.download_directory)
    }

    /// Bytes requested per read, at least one.
    pub(crate) fn chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }

    /// Timeout for each request.
    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The normalized audio allow-list.
    pub(crate) fn audio_extensions(&self) -> AudioExtensions {
        AudioExtensions::new(&self.audio_extensions)
    }

    pub(crate) fn catalogs(&self) -> &[CatalogSource] {
        &self.catalogs
    }

    /// Checks config and ensure it isn't missing.
    pub(crate) fn config_exists() -> bool {
        if !Path::new(CONFIG_NAME).exists() {
            trace!("{}: does not exist!", CONFIG_NAME);
            return false;
        }

        true
    }

    /// Creates config file.
    pub(crate) fn create_config() -> Result<(), Error> {
        let json = to_string_pretty(&Config::default())?;
        write(Path::new(CONFIG_NAME), json)
            .with_context(|| format!("Failed to write {}", CONFIG_NAME))?;

        Ok(())
    }

    /// Get the global instance of the `Config`.
    pub(crate) fn get() -> &'static Config {
        CONFIG.get_or_init(|| match Self::load(Path::new(CONFIG_NAME)) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config: {:#}", e);
                emergency_exit("Configuration loading failed");
            }
        })
    }

    /// Loads and validates a config file.
    pub(crate) fn load(path: &Path) -> Result<Self, Error> {
        let contents = read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if config.download_directory.trim().is_empty() {
            anyhow::bail!("downloadDirectory must not be empty");
        }
        if config.audio_extensions().extensions().is_empty() {
            anyhow::bail!("audioExtensions must name at least one extension");
        }
        if config.request_timeout_secs == 0 {
            anyhow::bail!("requestTimeoutSecs must be greater than zero");
        }

        Ok(config)
    }

    /// Writes the example catalog for every configured category whose file is missing.
    ///
    /// Returns the files that were created.
    pub(crate) fn create_missing_catalogs(&self) -> Result<Vec<PathBuf>, Error> {
        let mut created = Vec::new();
        for source in &self.catalogs {
            let path = PathBuf::from(&source.file);
            if path.exists() {
                continue;
            }

            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            write(&path, CATALOG_FILE_EXAMPLE)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            trace!("Catalog file \"{}\" created...", path.display());
            created.push(path);
        }

        Ok(created)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            download_directory: default_download_directory(),
            chunk_size: default_chunk_size(),
            request_timeout_secs: default_request_timeout_secs(),
            audio_extensions: default_audio_extensions(),
            catalogs: default_catalogs(),
        }
    }
}

/// Exits the program after message explaining the error and prompting the user to press `ENTER`.
///
/// # Arguments
///
/// * `error`: The error message to print.
pub(crate) fn emergency_exit(error: &str) -> ! {
    error!("{}", error);
    println!("Press ENTER to close the application...");

    let mut line = String::new();
    io::stdin().read_line(&mut line).unwrap_or_default();

    exit(0x00FF);
}
