//! Classification of scanned QR payloads
//!
//! Track links are recognized by a fixed URL prefix and playlist links by a
//! distinct path segment. The identifier is the path segment following
//! `/track/` or `/playlist/`, with any query string or fragment stripped.

/// Prefix every scannable link must carry.
const LINK_PREFIX: &str = "https://open.spotify.com/";
const TRACK_SEGMENT: &str = "/track/";
const PLAYLIST_SEGMENT: &str = "/playlist/";

/// A successfully classified scan payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTarget {
    /// Single track, by id
    Track(String),
    /// Playlist, by id
    Playlist(String),
}

/// Classify a decoded QR payload.
///
/// Returns `None` for anything that is not a track or playlist link;
/// callers treat that as a scan-format error. Track and playlist
/// classification are mutually exclusive by construction.
pub fn classify(payload: &str) -> Option<ScanTarget> {
    if !payload.starts_with(LINK_PREFIX) {
        return None;
    }
    if let Some(id) = extract_id(payload, TRACK_SEGMENT) {
        return Some(ScanTarget::Track(id));
    }
    if let Some(id) = extract_id(payload, PLAYLIST_SEGMENT) {
        return Some(ScanTarget::Playlist(id));
    }
    None
}

pub fn is_track_url(payload: &str) -> bool {
    matches!(classify(payload), Some(ScanTarget::Track(_)))
}

pub fn is_playlist_url(payload: &str) -> bool {
    matches!(classify(payload), Some(ScanTarget::Playlist(_)))
}

/// Remote playback URI for a track id.
pub fn track_uri(track_id: &str) -> String {
    format!("spotify:track:{track_id}")
}

/// Extract the path segment following `segment`, stopping at the next
/// separator. Empty segments yield `None`.
fn extract_id(payload: &str, segment: &str) -> Option<String> {
    let (_, rest) = payload.split_once(segment)?;
    let end = rest.find(['?', '/', '#']).unwrap_or(rest.len());
    let id = &rest[..end];
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
