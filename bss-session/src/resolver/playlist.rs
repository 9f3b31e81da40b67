//! Playlist resolution
//!
//! Fetches a playlist as a flat track list, requesting only the fields the
//! game needs. Non-track items (episodes and the like) and items missing
//! an id are filtered out; an empty list after filtering is the defined
//! "empty playlist" outcome, not an error.

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::ResolveError;
use bss_common::config::Config;
use bss_common::types::Track;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Field projection for the playlist items request.
const PLAYLIST_FIELDS: &str =
    "items(track(id,name,type,artists(name),duration_ms,preview_url))";

/// Page size cap for one round of the game.
const PLAYLIST_PAGE_LIMIT: &str = "50";

/// Fallback duration when the metadata source omits one.
const DEFAULT_DURATION_MS: u64 = 180_000;

const UNKNOWN_ARTIST: &str = "Unknown Artist";

#[derive(Debug, Deserialize)]
struct PlaylistItemsResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<ItemTrack>,
}

#[derive(Debug, Deserialize)]
struct ItemTrack {
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    artists: Vec<ItemArtist>,
    duration_ms: Option<u64>,
    preview_url: Option<String>,
    #[serde(rename = "type")]
    item_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemArtist {
    #[serde(default)]
    name: String,
}

/// Production playlist resolver over the vendor API.
pub struct PlaylistResolver {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl PlaylistResolver {
    pub fn new(config: &Config) -> Result<Self, ResolveError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ResolveError::Network(e.to_string()))?;
        Ok(Self {
            http,
            api_base: config.api_base_url.clone(),
            access_token: config.access_token.clone(),
        })
    }

    /// Fetch the playable tracks of a playlist.
    ///
    /// `Ok(vec![])` is the "empty playlist" outcome the caller surfaces as
    /// guidance ("pick another playlist"), not as an error.
    pub async fn fetch_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, ResolveError> {
        let url = format!("{}/playlists/{}/tracks", self.api_base, playlist_id);
        let response = self
            .http
            .get(&url)
            .query(&[("fields", PLAYLIST_FIELDS), ("limit", PLAYLIST_PAGE_LIMIT)])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ResolveError::Network(e.to_string()))?;

        if !response.status().is_success() {
            warn!(
                "Playlist fetch for {playlist_id} returned {}",
                response.status()
            );
            return Err(ResolveError::Status(response.status().as_u16()));
        }

        let body: PlaylistItemsResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::Parse(e.to_string()))?;

        let tracks: Vec<Track> = body.items.into_iter().filter_map(into_track).collect();
        debug!("Playlist {playlist_id} resolved to {} tracks", tracks.len());
        Ok(tracks)
    }
}

/// Map one playlist item into a `Track`, dropping non-track items and
/// items without an id.
fn into_track(item: PlaylistItem) -> Option<Track> {
    let track = item.track?;
    if track.item_type.as_deref().unwrap_or("track") != "track" {
        return None;
    }
    let id = track.id.filter(|id| !id.is_empty())?;

    let artists: Vec<String> = track
        .artists
        .into_iter()
        .map(|a| a.name)
        .filter(|name| !name.is_empty())
        .collect();

    Some(Track {
        id,
        title: track.name,
        artists: if artists.is_empty() {
            vec![UNKNOWN_ARTIST.to_string()]
        } else {
            artists
        },
        duration_ms: track.duration_ms.unwrap_or(DEFAULT_DURATION_MS),
        preview_url: track.preview_url.filter(|url| !url.is_empty()),
    })
}
