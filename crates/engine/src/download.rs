//! # Media Downloader
//!
//! Streams play URLs, image galleries and covers to disk. Filenames are
//! derived from the record and sanitized for cross-platform use; partially
//! written files are removed when a transfer dies.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use douyin_parser::VideoRecord;
use douyin_parser::session::DEFAULT_UA;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use rustls::{ClientConfig, crypto::ring};
use rustls_platform_verifier::BuilderVerifierExt;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use crate::error::DownloadError;
use crate::proxy::build_proxy;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_COMPONENT_LEN: usize = 50;

/// Per-call knobs for [`MediaDownloader::download`].
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Target directory, created if missing.
    pub dir: PathBuf,
    /// Re-download files that already exist.
    pub overwrite: bool,
    /// Also fetch the cover image.
    pub with_cover: bool,
    /// Draw progress bars while transferring.
    pub show_progress: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            overwrite: false,
            with_cover: false,
            show_progress: true,
        }
    }
}

/// File-granular counters for one download call.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DownloadStats {
    pub total: u64,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub bytes: u64,
}

pub struct MediaDownloader {
    client: Client,
}

impl MediaDownloader {
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_proxy(None)
    }

    /// Routes every transfer through `proxy` when given.
    pub fn with_proxy(proxy: Option<&str>) -> Result<Self, DownloadError> {
        Ok(Self {
            client: build_media_client(proxy)?,
        })
    }

    /// Downloads the record's media into `options.dir`. Individual file
    /// failures are counted in the returned stats rather than aborting the
    /// call, so a half-broken gallery still yields the rest of its images.
    #[instrument(skip(self, record, options), fields(aweme_id = %record.aweme_id), level = "debug")]
    pub async fn download(
        &self,
        record: &VideoRecord,
        options: &DownloadOptions,
    ) -> Result<DownloadStats, DownloadError> {
        fs::create_dir_all(&options.dir).await?;
        let stem = file_stem(record);
        let mut stats = DownloadStats::default();

        if record.is_image_post() {
            let gallery = options.dir.join(&stem);
            fs::create_dir_all(&gallery).await?;
            for (index, url) in record.images.iter().enumerate() {
                let path = gallery.join(format!("image_{:02}.jpg", index + 1));
                self.fetch_one(url, &path, options, &mut stats).await;
            }
        } else {
            let video_url = record
                .video_url
                .as_deref()
                .filter(|u| !u.is_empty())
                .ok_or_else(|| DownloadError::NoMedia(record.aweme_id.clone()))?;
            let path = options.dir.join(format!("{stem}.mp4"));
            self.fetch_one(video_url, &path, options, &mut stats).await;
        }

        if options.with_cover {
            match record.cover_url.as_deref().filter(|u| !u.is_empty()) {
                Some(cover_url) => {
                    let path = options.dir.join(format!("{stem}_cover.jpg"));
                    self.fetch_one(cover_url, &path, options, &mut stats).await;
                }
                None => debug!(aweme_id = %record.aweme_id, "record has no cover url"),
            }
        }

        Ok(stats)
    }

    async fn fetch_one(
        &self,
        url: &str,
        path: &Path,
        options: &DownloadOptions,
        stats: &mut DownloadStats,
    ) {
        stats.total += 1;

        if !options.overwrite {
            if let Ok(true) = fs::try_exists(path).await {
                debug!(path = %path.display(), "file exists, skipping");
                stats.skipped += 1;
                return;
            }
        }

        match self.stream_to_file(url, path, options.show_progress).await {
            Ok(written) => {
                stats.completed += 1;
                stats.bytes += written;
            }
            Err(e) => {
                warn!(url, path = %path.display(), error = %e, "download failed");
                stats.failed += 1;
            }
        }
    }

    async fn stream_to_file(
        &self,
        url: &str,
        path: &Path,
        show_progress: bool,
    ) -> Result<u64, DownloadError> {
        debug!(url, path = %path.display(), "starting transfer");

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::StatusCode(response.status()));
        }

        let bar = make_bar(response.content_length(), path, show_progress);
        let mut file = fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        let outcome: Result<(), DownloadError> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
                bar.set_position(written);
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                bar.finish_and_clear();
                debug!(path = %path.display(), bytes = written, "transfer complete");
                Ok(written)
            }
            Err(e) => {
                bar.abandon();
                drop(file);
                if let Err(remove_err) = fs::remove_file(path).await {
                    warn!(path = %path.display(), error = %remove_err, "failed to remove partial file");
                }
                Err(e)
            }
        }
    }
}

fn build_media_client(proxy: Option<&str>) -> Result<Client, DownloadError> {
    let provider = Arc::new(ring::default_provider());
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .expect("Failed to configure default TLS protocol versions")
        .with_platform_verifier()
        .unwrap()
        .with_no_client_auth();

    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(DEFAULT_UA),
    );
    headers.insert(
        reqwest::header::REFERER,
        HeaderValue::from_static("https://www.douyin.com/"),
    );

    // no overall timeout; media transfers run as long as bytes keep flowing
    let mut builder = Client::builder()
        .use_preconfigured_tls(tls_config)
        .default_headers(headers)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(10));

    if let Some(url) = proxy {
        builder = builder.proxy(build_proxy(url)?);
    }

    Ok(builder.build()?)
}

fn make_bar(total: Option<u64>, path: &Path, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let bar = match total {
        Some(len) => {
            let bar = ProgressBar::new(len);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {bytes}/{total_bytes} @ {bytes_per_sec}")
                    .unwrap()
                    .progress_chars("=> "),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg} {bytes} @ {bytes_per_sec}")
                    .unwrap(),
            );
            bar.enable_steady_tick(Duration::from_millis(500));
            bar
        }
    };
    bar.set_message(format!("Downloading {name}"));
    bar
}

/// `{author}_{title}_{id}`, each component sanitized.
fn file_stem(record: &VideoRecord) -> String {
    let author = sanitize_component(&record.author.nickname, "douyin");
    let title = sanitize_component(&record.title, &record.aweme_id);
    format!("{author}_{title}_{}", record.aweme_id)
}

/// Strips characters that are unsafe in filenames, collapses whitespace
/// runs to `_` and caps the length. Empty results fall back to `fallback`.
fn sanitize_component(raw: &str, fallback: &str) -> String {
    let mut out = String::new();
    let mut pending_sep = false;
    for ch in raw.chars() {
        if ch.is_control() || matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') {
            continue;
        }
        if ch.is_whitespace() {
            pending_sep = !out.is_empty();
            continue;
        }
        if pending_sep {
            out.push('_');
            pending_sep = false;
        }
        out.push(ch);
    }

    let capped: String = out.chars().take(MAX_COMPONENT_LEN).collect();
    if capped.is_empty() {
        fallback.to_string()
    } else {
        capped
    }
}
