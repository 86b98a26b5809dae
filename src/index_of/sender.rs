use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, USER_AGENT};

use crate::index_of::error::{DownloadError, ListingError};

/// Timeout applied to every request unless the config says otherwise.
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// The user agent sent with every request.
const CLIENT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// A remote file that answered with a success status and whose body has not been read yet.
pub(crate) struct RemoteFile {
    /// The declared `Content-Length`, if present and parsable.
    pub(crate) content_length: Option<u64>,
    /// The response body.
    pub(crate) body: Box<dyn Read>,
}

/// Something that can open a streaming read of a file by URL.
pub(crate) trait FileSource {
    /// Sends the request and returns the unread body.
    ///
    /// Network errors and non-2xx statuses are [DownloadError::FetchFailed].
    fn open(&self, url: &str) -> Result<RemoteFile, DownloadError>;
}

/// Sends every HTTP request the downloader makes.
#[derive(Clone, Debug)]
pub(crate) struct RequestSender {
    client: Client,
}

impl RequestSender {
    /// Creates a sender with the given per-request timeout.
    pub(crate) fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        trace!("Request sender created with {}s timeout", timeout.as_secs());
        Ok(Self { client })
    }

    /// Fetches a listing page and returns its HTML.
    pub(crate) fn get_listing(&self, url: &str) -> Result<String, ListingError> {
        trace!("Fetching listing {url}");
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .send()
            .map_err(|source| ListingError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListingError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().map_err(|source| ListingError::Body {
            url: url.to_string(),
            source,
        })
    }
}

impl FileSource for RequestSender {
    fn open(&self, url: &str) -> Result<RemoteFile, DownloadError> {
        let fetch_failed = |reason: String| DownloadError::FetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .send()
            .map_err(|e| fetch_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_failed(format!("HTTP {status}")));
        }

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        Ok(RemoteFile {
            content_length,
            body: Box::new(response),
        })
    }
}
