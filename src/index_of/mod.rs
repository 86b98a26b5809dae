use std::path::Path;

use anyhow::{Context, Error};
use console::style;
use dialoguer::Confirm;

use crate::index_of::downloader::{BatchDownloader, DownloadOutcome};
use crate::index_of::filter::{AudioExtensions, classify, count_audio, filter_links};
use crate::index_of::interrupt::InterruptHandler;
use crate::index_of::io::Config;
use crate::index_of::io::directory::create_output_directory;
use crate::index_of::listing::extract_hrefs;
use crate::index_of::sender::RequestSender;

pub(crate) mod downloader;
pub(crate) mod error;
pub(crate) mod filter;
pub(crate) mod interrupt;
pub(crate) mod io;
pub(crate) mod listing;
pub(crate) mod sender;
pub(crate) mod tui;

/// Horizontal rule around the summary block.
const SUMMARY_RULE: &str = "-----------------------------------------------------------";

/// Connects listing pages to the downloader: fetch, filter, create the folder, download, report.
pub(crate) struct IndexOfConnector {
    /// The sender used for all requests.
    request_sender: RequestSender,
    /// Which links count as audio.
    extensions: AudioExtensions,
    /// Bytes per read while streaming.
    chunk_size: usize,
    /// Routes Ctrl-C to the running batch.
    interrupt: InterruptHandler,
}

impl IndexOfConnector {
    /// Creates a connector from the loaded config.
    pub(crate) fn new(config: &Config, interrupt: InterruptHandler) -> Result<Self, Error> {
        let request_sender = RequestSender::new(config.request_timeout())
            .context("Failed to build the HTTP client")?;

        Ok(Self {
            request_sender,
            extensions: config.audio_extensions(),
            chunk_size: config.chunk_size(),
            interrupt,
        })
    }

    /// Downloads every audio file listed on `listing_url` into `dest_dir`.
    ///
    /// Failing to fetch the listing is an error and leaves the disk untouched. Failures of
    /// single files only show up in the returned counts. Ctrl-C from the start of the fetch
    /// on cancels the listing and is reported through [DownloadOutcome::cancelled].
    pub(crate) fn download_listing(&self, listing_url: &str, dest_dir: &Path) -> Result<DownloadOutcome, Error> {
        let _batch = self.interrupt.begin_batch();
        let cancel = self.interrupt.cancel_flag();

        info!("Fetching listing {}", style(listing_url).color256(39).italic());
        let listing = self.request_sender.get_listing(listing_url);
        if cancel.is_cancelled() {
            warn!("Listing {} was cancelled before downloading started.", listing_url);
            return Ok(DownloadOutcome {
                cancelled: true,
                ..DownloadOutcome::default()
            });
        }
        let html = listing?;

        let hrefs = extract_hrefs(&html);
        let filtered = filter_links(&hrefs);
        for href in &hrefs {
            trace!("{} -> {}", href, classify(href, &self.extensions));
        }
        let audio_count = count_audio(&filtered, &self.extensions);
        trace!(
            "Listing has {} anchors, {} after filtering, {} audio",
            hrefs.len(),
            filtered.len(),
            audio_count
        );
        info!(
            "Found {} files, {} of them audio. Everything else is ignored.",
            filtered.len(),
            audio_count
        );

        if audio_count == 0 {
            return Ok(DownloadOutcome::default());
        }

        create_output_directory(dest_dir)?;
        info!("Saving to {}", dest_dir.display());

        let outcome = BatchDownloader::new(&self.request_sender, self.extensions.clone())
            .chunk_size(self.chunk_size)
            .cancel_flag(cancel)
            .show_progress(console::user_attended_stderr())
            .download_batch(&filtered, listing_url, dest_dir);

        Ok(outcome)
    }

    /// Prints the end-of-listing summary.
    pub(crate) fn print_summary(&self, outcome: &DownloadOutcome) {
        println!("\n{}", SUMMARY_RULE);
        println!("Total audio files:  {}", outcome.total_audio);
        println!("{} {}", style("Successful:").green(), outcome.succeeded);
        println!("{} {}", style("Couldn't download:").red(), outcome.failed);
        if outcome.cancelled {
            println!("{}", style("Cancelled by user.").yellow());
        }
        println!("{}\n", SUMMARY_RULE);
    }

    /// Asks the user for confirmation before exiting
    /// Returns true if the user wants to exit, false to continue
    pub(crate) fn confirm_exit(&self, message: &str) -> bool {
        let prompt = format!("{}\nDo you want to exit the program?", message);

        Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    use tempfile::tempdir;
    use tokio::runtime::Runtime;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector() -> IndexOfConnector {
        IndexOfConnector::new(&Config::default(), InterruptHandler::detached()).unwrap()
    }

    fn serve_listing(rt: &Runtime, template: ResponseTemplate) -> MockServer {
        rt.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/music/"))
                .respond_with(template)
                .mount(&server)
                .await;
            server
        })
    }

    #[test]
    fn test_failed_listing_creates_nothing() {
        let rt = Runtime::new().unwrap();
        let server = serve_listing(&rt, ResponseTemplate::new(404));
        let root = tempdir().unwrap();
        let dest = root.path().join("music");

        let result = connector().download_listing(&format!("{}/music/", server.uri()), &dest);

        assert!(result.is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn test_listing_without_audio_creates_nothing() {
        let rt = Runtime::new().unwrap();
        let html = r#"<a href="?C=N;O=D">Name</a><a href="../">Parent</a><a href="cover.jpg">cover</a>"#;
        let server = serve_listing(&rt, ResponseTemplate::new(200).set_body_string(html));
        let root = tempdir().unwrap();
        let dest = root.path().join("music");

        let outcome = connector()
            .download_listing(&format!("{}/music/", server.uri()), &dest)
            .unwrap();

        assert_eq!(outcome, DownloadOutcome::default());
        assert!(!dest.exists());
    }

    #[test]
    fn test_listing_downloads_audio() {
        let rt = Runtime::new().unwrap();
        let html = r#"<a href="../">Parent</a><a href="song.mp3">song</a><a href="cover.jpg">cover</a>"#;
        let server = serve_listing(&rt, ResponseTemplate::new(200).set_body_string(html));
        rt.block_on(
            Mock::given(method("GET"))
                .and(path("/music/song.mp3"))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![3u8; 700]))
                .mount(&server),
        );
        let root = tempdir().unwrap();
        let dest = root.path().join("music");

        let outcome = connector()
            .download_listing(&format!("{}/music/", server.uri()), &dest)
            .unwrap();

        assert_eq!(outcome.total_audio, 1);
        assert_eq!(outcome.succeeded, 1);
        assert!(!outcome.cancelled);
        assert_eq!(std::fs::read(dest.join("song.mp3")).unwrap().len(), 700);
    }

    #[test]
    fn test_interrupt_during_listing_fetch_cancels() {
        let rt = Runtime::new().unwrap();
        let html = r#"<a href="song.mp3">song</a>"#;
        let server = serve_listing(
            &rt,
            ResponseTemplate::new(200)
                .set_body_string(html)
                .set_delay(Duration::from_millis(1500)),
        );
        let root = tempdir().unwrap();
        let dest = root.path().join("music");
        let connector = connector();

        let cancel = connector.interrupt.cancel_flag();
        let interrupter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            cancel.cancel();
        });
        let outcome = connector
            .download_listing(&format!("{}/music/", server.uri()), &dest)
            .unwrap();
        interrupter.join().unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.total_audio, 0);
        assert!(!dest.exists());
    }
}
