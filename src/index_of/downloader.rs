use std::fs::{OpenOptions, remove_file};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use crate::index_of::error::DownloadError;
use crate::index_of::filter::{AudioExtensions, audio_links};
use crate::index_of::interrupt::CancelFlag;
use crate::index_of::io::directory::remove_invalid_chars;
use crate::index_of::listing::percent_decode;
use crate::index_of::sender::{FileSource, RemoteFile};
use crate::index_of::tui::file_progress_bar;

/// Bytes requested per read while streaming a body to disk.
pub(crate) const DEFAULT_CHUNK_SIZE: usize = 256;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Counts for one batch. `succeeded + failed == total_audio` once the batch returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DownloadOutcome {
    pub(crate) total_audio: usize,
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
    /// Set when the user interrupted the batch. Callers should stop queuing more work.
    pub(crate) cancelled: bool,
}

impl DownloadOutcome {
    fn record(&mut self, result: &Result<u64, DownloadError>) {
        match result {
            Ok(_) => self.succeeded += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Turns an href into an absolute URL.
///
/// `http://` and `https://` hrefs are used as they are. Everything else is joined onto
/// `base_url` with exactly one `/` between them.
pub(crate) fn resolve_url(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        href.trim_start_matches('/')
    )
}

/// The name a file is saved under: the decoded href after its final slash or backslash, with
/// characters that are invalid in file names replaced.
pub(crate) fn file_name_for(href: &str) -> String {
    let decoded = percent_decode(href);
    let name = match decoded.rsplit_once(['/', '\\']) {
        Some((_, name)) => name,
        None => decoded.as_str(),
    };
    remove_invalid_chars(name)
}

/// Joins `name` onto `dest_dir`, refusing anything that is not a single plain path component.
fn destination_path(dest_dir: &Path, name: &str) -> Result<PathBuf, DownloadError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(dest_dir.join(name)),
        _ => Err(DownloadError::WriteFailed {
            path: dest_dir.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("\"{name}\" is not a plain file name"),
            ),
        }),
    }
}

/// How many chunks a body of `content_length` bytes is expected to take.
///
/// `None` means the size is unknown (missing or zero length) and progress is indeterminate.
pub(crate) fn expected_chunks(content_length: Option<u64>, chunk_size: usize) -> Option<u64> {
    match content_length {
        Some(len) if len > 0 => Some((len / chunk_size.max(1) as u64).max(1)),
        _ => None,
    }
}

/// Human readable size in binary megabytes, e.g. `1.00 MB`, or `Unknown size`.
pub(crate) fn format_size_mb(content_length: Option<u64>) -> String {
    match content_length {
        Some(len) => format!("{:.2} MB", len as f64 / BYTES_PER_MB),
        None => String::from("Unknown size"),
    }
}

/// Streams every audio link of a listing into one directory, one file at a time.
pub(crate) struct BatchDownloader<'a> {
    /// Where bodies are fetched from.
    source: &'a dyn FileSource,
    /// The allow-list that decides which links are audio.
    extensions: AudioExtensions,
    /// Bytes per read.
    chunk_size: usize,
    /// Polled before each file and between chunks.
    cancel: CancelFlag,
    /// Whether progress bars are drawn.
    show_progress: bool,
}

impl<'a> BatchDownloader<'a> {
    pub(crate) fn new(source: &'a dyn FileSource, extensions: AudioExtensions) -> Self {
        Self {
            source,
            extensions,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cancel: CancelFlag::default(),
            show_progress: true,
        }
    }

    /// Sets the read size. Zero is raised to one.
    pub(crate) fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub(crate) fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn show_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Downloads every audio entry of `filtered_links` into `dest_dir`, which must already exist.
    ///
    /// A failing file never stops the batch. It is counted in [DownloadOutcome::failed]
    /// and whatever was written for it is removed.
    pub(crate) fn download_batch<S: AsRef<str>>(
        &self,
        filtered_links: &[S],
        base_url: &str,
        dest_dir: &Path,
    ) -> DownloadOutcome {
        let audio = audio_links(filtered_links, &self.extensions);
        let total = audio.len();
        let mut outcome = DownloadOutcome {
            total_audio: total,
            ..DownloadOutcome::default()
        };

        for (i, href) in audio.iter().enumerate() {
            let index = i + 1;
            let result = self.download_file(href, base_url, dest_dir, index, total);
            match &result {
                Ok(bytes) => debug!("[{}/{}] Saved {} bytes from {}", index, total, bytes, href),
                Err(err) => warn!("[{}/{}] {}", index, total, err),
            }
            outcome.record(&result);
        }

        outcome.cancelled = self.cancel.is_cancelled();
        trace!(
            "Batch finished: {} audio, {} succeeded, {} failed, cancelled: {}",
            outcome.total_audio, outcome.succeeded, outcome.failed, outcome.cancelled
        );
        outcome
    }

    /// Fetches one href and writes it under `dest_dir`. Returns the number of bytes written.
    fn download_file(
        &self,
        href: &str,
        base_url: &str,
        dest_dir: &Path,
        index: usize,
        total: usize,
    ) -> Result<u64, DownloadError> {
        let name = file_name_for(href);
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled { name });
        }

        let path = destination_path(dest_dir, &name)?;
        let url = resolve_url(base_url, href);
        trace!("[{}/{}] Requesting {}", index, total, url);
        let remote = self.source.open(&url)?;

        let label = format!(
            "[{}/{}] {} ({})",
            index,
            total,
            name,
            format_size_mb(remote.content_length)
        );

        let result = self.stream_to_file(remote, &path, &name, label);
        if result.is_err() {
            remove_partial_file(&path);
        }
        result
    }

    fn stream_to_file(
        &self,
        mut remote: RemoteFile,
        path: &Path,
        name: &str,
        label: String,
    ) -> Result<u64, DownloadError> {
        let write_failed = |source: io::Error| DownloadError::WriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(write_failed)?;

        let chunk_size = self.chunk_size as u64;
        let expected = expected_chunks(remote.content_length, self.chunk_size);
        let progress_bar = file_progress_bar(expected, label, self.show_progress);

        let mut buffer = vec![0u8; self.chunk_size];
        let mut written: u64 = 0;
        let streamed = loop {
            if self.cancel.is_cancelled() {
                break Err(DownloadError::Cancelled {
                    name: name.to_string(),
                });
            }

            let read = match remote.body.read(&mut buffer) {
                Ok(0) => break Ok(()),
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(write_failed(e)),
            };

            if let Err(e) = file.write_all(&buffer[..read]) {
                break Err(write_failed(e));
            }
            written += read as u64;

            if expected.is_some() {
                progress_bar.set_position(written / chunk_size);
            } else {
                progress_bar.set_position(written);
            }
        };

        let finished = streamed
            .and_then(|_| file.flush().map_err(write_failed))
            .and_then(|_| match remote.content_length {
                Some(declared) if written < declared => Err(write_failed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {written} of {declared} bytes"),
                ))),
                _ => Ok(written),
            });

        match &finished {
            Ok(_) => progress_bar.finish_with_message(format!("Download Successful: {name}")),
            Err(_) => progress_bar.abandon_with_message(format!("Download Failed: {name}")),
        }
        finished
    }
}

/// Best-effort removal of a partially written file.
fn remove_partial_file(path: &Path) {
    if !path.exists() {
        return;
    }

    match remove_file(path) {
        Ok(()) => trace!("Removed partial file {}", path.display()),
        Err(e) => debug!("Unable to remove partial file {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::time::Duration;

    use tempfile::tempdir;
    use tokio::runtime::Runtime;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::index_of::sender::RequestSender;

    /// Yields `data`, then fails the next read.
    struct BrokenReader {
        data: Cursor<Vec<u8>>,
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let read = self.data.read(buf)?;
            if read == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection dropped"));
            }
            Ok(read)
        }
    }

    /// Yields `data`, cancelling the batch on the first read.
    struct CancellingReader {
        data: Cursor<Vec<u8>>,
        cancel: CancelFlag,
    }

    impl Read for CancellingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.cancel.cancel();
            self.data.read(buf)
        }
    }

    enum Served {
        Body(Vec<u8>, Option<u64>),
        Status(u16),
        Broken(Vec<u8>),
        Cancelling(Vec<u8>, CancelFlag),
    }

    #[derive(Default)]
    struct FakeSource {
        files: HashMap<String, Served>,
        requested: RefCell<Vec<String>>,
    }

    impl FakeSource {
        fn serve(mut self, url: &str, served: Served) -> Self {
            self.files.insert(url.to_string(), served);
            self
        }
    }

    impl FileSource for FakeSource {
        fn open(&self, url: &str) -> Result<RemoteFile, DownloadError> {
            self.requested.borrow_mut().push(url.to_string());
            let fetch_failed = |reason: &str| DownloadError::FetchFailed {
                url: url.to_string(),
                reason: reason.to_string(),
            };

            match self.files.get(url) {
                None => Err(fetch_failed("connection refused")),
                Some(Served::Status(status)) => Err(fetch_failed(&format!("HTTP {status}"))),
                Some(Served::Body(data, content_length)) => Ok(RemoteFile {
                    content_length: *content_length,
                    body: Box::new(Cursor::new(data.clone())),
                }),
                Some(Served::Broken(data)) => Ok(RemoteFile {
                    content_length: Some(data.len() as u64 * 2),
                    body: Box::new(BrokenReader {
                        data: Cursor::new(data.clone()),
                    }),
                }),
                Some(Served::Cancelling(data, cancel)) => Ok(RemoteFile {
                    content_length: Some(data.len() as u64),
                    body: Box::new(CancellingReader {
                        data: Cursor::new(data.clone()),
                        cancel: cancel.clone(),
                    }),
                }),
            }
        }
    }

    const BASE: &str = "http://example.com/music";

    fn body(len: usize) -> Served {
        Served::Body(vec![7u8; len], Some(len as u64))
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(resolve_url(BASE, "track.mp3"), "http://example.com/music/track.mp3");
        assert_eq!(resolve_url("http://example.com/music/", "/track.mp3"), "http://example.com/music/track.mp3");
        assert_eq!(resolve_url(BASE, "https://cdn.example.com/a.flac"), "https://cdn.example.com/a.flac");
        assert_eq!(resolve_url(BASE, "http://cdn.example.com/b.wav"), "http://cdn.example.com/b.wav");
    }

    #[test]
    fn test_file_name_for() {
        assert_eq!(file_name_for("track%202.wav"), "track 2.wav");
        assert_eq!(file_name_for("Live%20Sets/set%201.mp3"), "set 1.mp3");
        assert_eq!(file_name_for("https://cdn.example.com/a/b.flac"), "b.flac");
        assert_eq!(file_name_for("a%2Fb.mp3"), "b.mp3");
    }

    #[test]
    fn test_file_name_for_strips_backslashes_and_drives() {
        assert_eq!(file_name_for("..%5C..%5Cx.mp3"), "x.mp3");
        assert_eq!(file_name_for("C:%5Cevil.mp3"), "evil.mp3");
        assert_eq!(file_name_for("C%3Aevil.mp3"), "C_evil.mp3");
        assert_eq!(file_name_for("what%3F.wav"), "what_.wav");
    }

    #[test]
    fn test_destination_path_rejects_non_plain_names() {
        let dir = Path::new("output");
        assert_eq!(destination_path(dir, "x.mp3").unwrap(), dir.join("x.mp3"));

        for name in ["", ".", "..", "a/b.mp3", "/x.mp3"] {
            assert!(
                matches!(destination_path(dir, name), Err(DownloadError::WriteFailed { .. })),
                "{name:?}"
            );
        }
    }

    #[test]
    fn test_backslash_hrefs_stay_inside_destination() {
        let root = tempdir().unwrap();
        let dest = root.path().join("listing");
        std::fs::create_dir(&dest).unwrap();
        let source = FakeSource::default()
            .serve("http://example.com/music/..%5C..%5Cx.mp3", body(10))
            .serve("http://example.com/music/C:%5Cevil.mp3", body(20));

        let outcome = BatchDownloader::new(&source, AudioExtensions::default())
            .show_progress(false)
            .download_batch(&["..%5C..%5Cx.mp3", "C:%5Cevil.mp3"], BASE, &dest);

        assert_eq!(outcome.succeeded, 2);
        assert_eq!(std::fs::read(dest.join("x.mp3")).unwrap().len(), 10);
        assert_eq!(std::fs::read(dest.join("evil.mp3")).unwrap().len(), 20);
        let entries: Vec<_> = std::fs::read_dir(root.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_expected_chunks_and_size() {
        assert_eq!(expected_chunks(Some(1_048_576), 256), Some(4096));
        assert_eq!(format_size_mb(Some(1_048_576)), "1.00 MB");

        assert_eq!(expected_chunks(Some(100), 256), Some(1));
        assert_eq!(expected_chunks(Some(0), 256), None);
        assert_eq!(expected_chunks(None, 256), None);
        assert_eq!(format_size_mb(None), "Unknown size");
        assert_eq!(format_size_mb(Some(3 * 1024 * 1024 / 2)), "1.50 MB");
    }

    #[test]
    fn test_batch_downloads_only_audio() {
        let dir = tempdir().unwrap();
        let source = FakeSource::default()
            .serve("http://example.com/music/song.mp3", body(1000))
            .serve("http://example.com/music/track%202.wav", body(300));
        let links = ["song.mp3", "cover.jpg", "track%202.wav"];

        let outcome = BatchDownloader::new(&source, AudioExtensions::default())
            .show_progress(false)
            .download_batch(&links, BASE, dir.path());

        assert_eq!(outcome, DownloadOutcome { total_audio: 2, succeeded: 2, failed: 0, cancelled: false });
        assert_eq!(std::fs::read(dir.path().join("song.mp3")).unwrap().len(), 1000);
        assert_eq!(std::fs::read(dir.path().join("track 2.wav")).unwrap().len(), 300);
        assert!(!dir.path().join("cover.jpg").exists());
        assert_eq!(
            *source.requested.borrow(),
            vec!["http://example.com/music/song.mp3", "http://example.com/music/track%202.wav"]
        );
    }

    #[test]
    fn test_not_found_counts_as_failed() {
        let dir = tempdir().unwrap();
        let source = FakeSource::default().serve("http://example.com/music/gone.mp3", Served::Status(404));

        let outcome = BatchDownloader::new(&source, AudioExtensions::default())
            .show_progress(false)
            .download_batch(&["gone.mp3"], BASE, dir.path());

        assert_eq!(outcome, DownloadOutcome { total_audio: 1, succeeded: 0, failed: 1, cancelled: false });
        assert!(!dir.path().join("gone.mp3").exists());
    }

    #[test]
    fn test_mid_stream_failure_is_isolated() {
        let dir = tempdir().unwrap();
        let source = FakeSource::default()
            .serve("http://example.com/music/1.mp3", body(600))
            .serve("http://example.com/music/2.mp3", body(600))
            .serve("http://example.com/music/3.mp3", Served::Broken(vec![1u8; 700]))
            .serve("http://example.com/music/4.mp3", body(600))
            .serve("http://example.com/music/5.mp3", body(600));
        let links = ["1.mp3", "2.mp3", "3.mp3", "4.mp3", "5.mp3"];

        let outcome = BatchDownloader::new(&source, AudioExtensions::default())
            .show_progress(false)
            .download_batch(&links, BASE, dir.path());

        assert_eq!(outcome, DownloadOutcome { total_audio: 5, succeeded: 4, failed: 1, cancelled: false });
        assert_eq!(outcome.succeeded + outcome.failed, outcome.total_audio);
        for name in ["1.mp3", "2.mp3", "4.mp3", "5.mp3"] {
            assert!(dir.path().join(name).exists(), "{name} should exist");
        }
        assert!(!dir.path().join("3.mp3").exists());
    }

    #[test]
    fn test_unknown_size_still_downloads() {
        let dir = tempdir().unwrap();
        let source = FakeSource::default()
            .serve("http://example.com/music/a.aac", Served::Body(vec![9u8; 513], None));

        let outcome = BatchDownloader::new(&source, AudioExtensions::default())
            .show_progress(false)
            .download_batch(&["a.aac"], BASE, dir.path());

        assert_eq!(outcome.succeeded, 1);
        assert_eq!(std::fs::read(dir.path().join("a.aac")).unwrap(), vec![9u8; 513]);
    }

    #[test]
    fn test_short_body_is_removed() {
        let dir = tempdir().unwrap();
        let source = FakeSource::default()
            .serve("http://example.com/music/short.flac", Served::Body(vec![1u8; 10], Some(20)));

        let outcome = BatchDownloader::new(&source, AudioExtensions::default())
            .show_progress(false)
            .download_batch(&["short.flac"], BASE, dir.path());

        assert_eq!(outcome.failed, 1);
        assert!(!dir.path().join("short.flac").exists());
    }

    #[test]
    fn test_missing_destination_fails_every_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("not-created");
        let source = FakeSource::default()
            .serve("http://example.com/music/a.mp3", body(10))
            .serve("http://example.com/music/b.mp3", body(10));

        let outcome = BatchDownloader::new(&source, AudioExtensions::default())
            .show_progress(false)
            .download_batch(&["a.mp3", "b.mp3"], BASE, &missing);

        assert_eq!(outcome, DownloadOutcome { total_audio: 2, succeeded: 0, failed: 2, cancelled: false });
    }

    #[test]
    fn test_cancelled_batch_skips_remaining_requests() {
        let dir = tempdir().unwrap();
        let cancel = CancelFlag::default();
        let source = FakeSource::default()
            .serve("http://example.com/music/a.mp3", Served::Cancelling(vec![2u8; 2000], cancel.clone()))
            .serve("http://example.com/music/b.mp3", body(10));

        let outcome = BatchDownloader::new(&source, AudioExtensions::default())
            .cancel_flag(cancel)
            .show_progress(false)
            .download_batch(&["a.mp3", "b.mp3"], BASE, dir.path());

        assert_eq!(outcome, DownloadOutcome { total_audio: 2, succeeded: 0, failed: 2, cancelled: true });
        assert!(!dir.path().join("a.mp3").exists());
        assert_eq!(source.requested.borrow().len(), 1);
    }

    #[test]
    fn test_chunk_size_does_not_change_bytes() {
        let dir = tempdir().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let source = FakeSource::default().serve(
            "http://example.com/music/a.m4a",
            Served::Body(data.clone(), Some(data.len() as u64)),
        );

        let outcome = BatchDownloader::new(&source, AudioExtensions::default())
            .chunk_size(0)
            .show_progress(false)
            .download_batch(&["a.m4a"], BASE, dir.path());

        assert_eq!(outcome.succeeded, 1);
        assert_eq!(std::fs::read(dir.path().join("a.m4a")).unwrap(), data);
    }

    #[test]
    fn test_batch_against_http_server() {
        let rt = Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        rt.block_on(async {
            Mock::given(method("GET"))
                .and(path("/music/ok.mp3"))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![5u8; 4096]))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/music/missing.wav"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;
        });

        let dir = tempdir().unwrap();
        let sender = RequestSender::new(Duration::from_secs(5)).unwrap();
        let base = format!("{}/music/", server.uri());

        let outcome = BatchDownloader::new(&sender, AudioExtensions::default())
            .show_progress(false)
            .download_batch(&["ok.mp3", "missing.wav", "notes.txt"], &base, dir.path());

        assert_eq!(outcome, DownloadOutcome { total_audio: 2, succeeded: 1, failed: 1, cancelled: false });
        assert_eq!(std::fs::read(dir.path().join("ok.mp3")).unwrap().len(), 4096);
        assert!(!dir.path().join("missing.wav").exists());
    }
}
