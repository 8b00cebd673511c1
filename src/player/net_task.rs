use futures::{
    StreamExt,
    future::{self, Either, LocalBoxFuture},
    pin_mut,
    stream::LocalBoxStream,
};
use log::{debug, info};
use url::Url;

use crate::{
    error::{PlayerError, PlayerResult},
    utils::elapsed_ms,
};

use super::abort::AbortSignal;

pub const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";

pub enum ResponseBody {
    /// Body delivered chunk by chunk.
    Stream(LocalBoxStream<'static, PlayerResult<Vec<u8>>>),
    /// Transport without a readable body stream; the payload arrives at once.
    Buffered(LocalBoxFuture<'static, PlayerResult<Vec<u8>>>),
}

pub struct FetchResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub body: ResponseBody,
}

impl FetchResponse {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait Transport {
    /// Issues a streamed GET. The transport should stop work when `signal`
    /// fires, but the fetcher does not rely on it.
    fn fetch(&self, url: &str, signal: &AbortSignal)
    -> LocalBoxFuture<'static, PlayerResult<FetchResponse>>;
}

/// Locally dereferenceable handle to downloaded bytes (an object URL in the
/// browser). Must be given back to the [`ResourceStore`] that created it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn new(url: impl Into<String>) -> ResourceHandle {
        ResourceHandle(url.into())
    }

    pub fn url(&self) -> &str {
        &self.0
    }
}

pub trait ResourceStore {
    fn create(&self, parts: &[Vec<u8>], content_type: &str) -> PlayerResult<ResourceHandle>;
    fn release(&self, handle: &ResourceHandle) -> PlayerResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DownloadProgress {
    /// Fraction in [0, 1].
    Known(f64),
    /// No usable content length; callers show an indeterminate state.
    Unknown,
}

impl DownloadProgress {
    fn from_counts(received: u64, total: Option<u64>) -> DownloadProgress {
        match total {
            Some(total) => DownloadProgress::Known((received as f64 / total as f64).min(1.0)),
            None => DownloadProgress::Unknown,
        }
    }

    pub fn fraction(&self) -> Option<f64> {
        match self {
            DownloadProgress::Known(fraction) => Some(*fraction),
            DownloadProgress::Unknown => None,
        }
    }
}

/// Downloads `url` into a playable resource, reporting progress after every
/// chunk. Fails with `NetworkError` on a non-success status and `Aborted` when
/// `signal` fires first.
pub async fn download_to_resource<T, S>(
    transport: &T,
    store: &S,
    url: &str,
    signal: &AbortSignal,
    mut on_progress: impl FnMut(DownloadProgress),
) -> PlayerResult<ResourceHandle>
where
    T: Transport + ?Sized,
    S: ResourceStore + ?Sized,
{
    if signal.is_aborted() {
        return Err(PlayerError::aborted());
    }

    let started_at = chrono::Local::now();
    let work = async {
        let response = transport.fetch(url, signal).await?;
        if !response.is_ok() {
            return Err(PlayerError::network(response.status));
        }

        let content_type = response
            .content_type
            .filter(|content_type| !content_type.is_empty())
            .unwrap_or_else(|| DEFAULT_AUDIO_MIME.to_string());
        let total = response.content_length.filter(|len| *len > 0);

        let mut parts: Vec<Vec<u8>> = Vec::new();
        let mut received: u64 = 0;
        match response.body {
            ResponseBody::Buffered(payload) => {
                let payload = payload.await?;
                received = payload.len() as u64;
                parts.push(payload);
            }
            ResponseBody::Stream(mut chunks) => {
                while let Some(chunk) = chunks.next().await {
                    let chunk = chunk?;
                    if chunk.is_empty() {
                        continue;
                    }
                    received += chunk.len() as u64;
                    parts.push(chunk);
                    on_progress(DownloadProgress::from_counts(received, total));
                }
            }
        }

        let handle = store.create(&parts, &content_type)?;
        Ok::<_, PlayerError>((handle, received))
    };
    pin_mut!(work);

    match future::select(work, signal.aborted()).await {
        Either::Left((result, _)) => {
            let (handle, received) = result?;
            info!(
                "Downloaded {} ({} bytes) in {} ms",
                url,
                received,
                elapsed_ms(started_at)
            );
            Ok(handle)
        }
        Either::Right(_) => {
            debug!("Download of {} aborted", url);
            Err(PlayerError::aborted())
        }
    }
}

/// Resolves a lesson-relative audio path against `base_path`. Absolute URLs
/// are returned untouched; without a base the path is left for the browser to
/// resolve against the document.
pub fn resolve_source_url(src: &str, base_path: Option<&Url>) -> PlayerResult<String> {
    if src.trim().is_empty() {
        return Err(PlayerError::invalid_config("audioSrc must not be empty"));
    }
    let slash_norm = src.replace('\\', "/");
    if let Ok(parsed_url) = Url::parse(&slash_norm) {
        if parsed_url.has_host() || parsed_url.scheme() == "blob" || parsed_url.scheme() == "data"
        {
            return Ok(parsed_url.to_string());
        }
    }

    match base_path {
        Some(base_path) => base_path
            .join(&slash_norm)
            .map(|url| url.to_string())
            .map_err(|e| PlayerError::invalid_config(format!("Invalid audio source {}: {}", src, e))),
        None => Ok(slash_norm),
    }
}

/// Normalises a base path so that relative joins stay inside it.
pub fn sanitize_base_path(base_path: &str) -> PlayerResult<Url> {
    let with_slash = if base_path.ends_with('/') {
        base_path.to_string()
    } else {
        format!("{}/", base_path)
    };
    Url::parse(&with_slash)
        .map_err(|e| PlayerError::invalid_config(format!("Invalid base path {}: {}", base_path, e)))
}
