use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a single file in a batch was not downloaded.
///
/// Every variant counts the same way in a batch: one failed file.
#[derive(Error, Debug)]
pub(crate) enum DownloadError {
    /// The request could not be sent, timed out or came back with a non-2xx status.
    #[error("Failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    /// Creating the file, reading the body or writing a chunk failed.
    #[error("Failed to write {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The batch was interrupted before this file completed.
    #[error("Download of {name} was cancelled")]
    Cancelled { name: String },
}

/// Why a listing page could not be fetched.
#[derive(Error, Debug)]
pub(crate) enum ListingError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Listing {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to read listing body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}
