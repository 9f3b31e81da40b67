//! Preview clip resolution
//!
//! Primary path: the track metadata endpoint's structured `preview_url`
//! field. Fallback path: fetch the public embed page for the track and
//! scan its markup for an embedded clip URL. The embed markup stores URLs
//! as escaped JSON string literals inside script content, so matched
//! values are unescaped before use.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::ResolveError;
use bss_common::config::Config;

/// The embed host serves a stripped page to unknown agents.
const EMBED_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Path segment every accepted preview URL must contain.
const PREVIEW_PATH_SEGMENT: &str = "mp3-preview";

/// Inline JSON "audio preview" object carrying a `url` key.
static AUDIO_PREVIEW_OBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""audioPreview"\s*:\s*\{\s*"url"\s*:\s*"([^"]+)""#).expect("static pattern")
});

/// Bare `preview_url` JSON key.
static PREVIEW_URL_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""preview_url"\s*:\s*"([^"]+)""#).expect("static pattern"));

/// Raw short-audio path fragment ending in an audio file extension.
static RAW_PREVIEW_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https:(?:\\/|/)(?:\\/|/)[^"\s]*mp3-preview(?:\\/|/)[^"\s]*?\.mp3"#)
        .expect("static pattern")
});

/// Port for preview lookups, so the state machine and the draw engine can
/// be driven by an in-memory fake in tests.
#[async_trait]
pub trait PreviewSource: Send + Sync {
    /// Resolve a playable short-audio URL for a track id.
    ///
    /// `Ok(None)` is the legitimate "no preview available for this track"
    /// outcome; `Err` is a resolution failure the caller may retry once.
    async fn resolve(&self, track_id: &str) -> Result<Option<String>, ResolveError>;
}

/// Resolve through `source` with the single automatic retry the failure
/// policy allows; a second failure propagates to the caller.
pub async fn resolve_with_retry<S: PreviewSource + ?Sized>(
    source: &S,
    track_id: &str,
) -> Result<Option<String>, ResolveError> {
    match source.resolve(track_id).await {
        Ok(found) => Ok(found),
        Err(first) => {
            warn!("Preview resolution failed for {track_id}, retrying once: {first}");
            source.resolve(track_id).await
        }
    }
}

/// Scan embed markup for a preview clip URL.
///
/// Patterns are tried in priority order; a match is accepted once its
/// unescaped value contains the short-audio path segment. `None` means no
/// pattern yielded an acceptable value.
pub fn extract_preview_url(html: &str) -> Option<String> {
    let candidates = [
        AUDIO_PREVIEW_OBJECT
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
        PREVIEW_URL_KEY
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
        RAW_PREVIEW_PATH.find(html).map(|m| m.as_str().to_string()),
    ];

    for candidate in candidates.into_iter().flatten() {
        let url = unescape_json_str(&candidate);
        if url.contains(PREVIEW_PATH_SEGMENT) {
            return Some(url);
        }
    }
    None
}

/// Reverse JSON string escaping for values lifted out of script content:
/// `\/` becomes `/` and `\uXXXX` escapes decode to their characters (the
/// embed markup encodes the ampersand as `\u0026`). Unparseable escapes are
/// kept verbatim.
pub fn unescape_json_str(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('/') => {
                chars.next();
                out.push('/');
            }
            Some('u') => {
                chars.next();
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => out.push(decoded),
                    _ => {
                        out.push('\\');
                        out.push('u');
                        out.push_str(&hex);
                    }
                }
            }
            _ => out.push('\\'),
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct TrackMetaResponse {
    preview_url: Option<String>,
}

/// Production preview resolver over the vendor metadata API and the public
/// embed page.
pub struct PreviewResolver {
    http: reqwest::Client,
    api_base: String,
    embed_base: String,
    access_token: String,
}

impl PreviewResolver {
    pub fn new(config: &Config) -> Result<Self, ResolveError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ResolveError::Network(e.to_string()))?;
        Ok(Self {
            http,
            api_base: config.api_base_url.clone(),
            embed_base: config.embed_base_url.clone(),
            access_token: config.access_token.clone(),
        })
    }

    /// Structured lookup via the track metadata endpoint.
    async fn fetch_structured(&self, track_id: &str) -> Result<Option<String>, ResolveError> {
        let url = format!("{}/tracks/{}", self.api_base, track_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ResolveError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolveError::Status(response.status().as_u16()));
        }

        let meta: TrackMetaResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::Parse(e.to_string()))?;
        Ok(meta.preview_url.filter(|u| !u.is_empty()))
    }

    /// Fallback lookup: scrape the public embed page.
    async fn fetch_from_embed(&self, track_id: &str) -> Result<Option<String>, ResolveError> {
        let url = format!("{}/track/{}", self.embed_base, track_id);
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::USER_AGENT, EMBED_USER_AGENT)
            .send()
            .await
            .map_err(|e| ResolveError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolveError::Status(response.status().as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ResolveError::Network(e.to_string()))?;
        Ok(extract_preview_url(&html))
    }
}

#[async_trait]
impl PreviewSource for PreviewResolver {
    async fn resolve(&self, track_id: &str) -> Result<Option<String>, ResolveError> {
        if !self.access_token.is_empty() {
            match self.fetch_structured(track_id).await {
                Ok(Some(url)) => {
                    debug!("Structured preview_url hit for {track_id}");
                    return Ok(Some(url));
                }
                Ok(None) => {}
                // Credential lacks metadata rights; the embed page is public.
                Err(ResolveError::Status(401 | 403)) => {}
                Err(e) => return Err(e),
            }
        }
        self.fetch_from_embed(track_id).await
    }
}
