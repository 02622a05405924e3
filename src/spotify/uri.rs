use std::{fmt, sync::LazyLock};

use regex::Regex;
use thiserror::Error;

static NATIVE_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^spotify:([a-zA-Z]+):([a-zA-Z0-9]{22})$").expect("native uri regex")
});

static BARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{22}$").expect("bare id regex"));

const WEB_PREFIXES: [&str; 2] = ["https://open.spotify.com/", "http://open.spotify.com/"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("empty uri")]
    Empty,
    #[error("unsupported spotify url: {0}")]
    UnsupportedUrl(String),
    #[error("expected playlist url; got: {0}")]
    NotAPlaylistUrl(String),
    #[error("invalid playlist selector: {0}")]
    InvalidPlaylist(String),
    #[error("not a track uri: {0}")]
    NotATrack(String),
}

/// Kind tag of a Spotify URI. Unrecognized tags are kept as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UriKind {
    Track,
    Album,
    Playlist,
    Artist,
    Show,
    Episode,
    Other(String),
    /// Not an identifier at all; callers treat the input as a search query.
    Unknown,
}

impl UriKind {
    fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "track" => UriKind::Track,
            "album" => UriKind::Album,
            "playlist" => UriKind::Playlist,
            "artist" => UriKind::Artist,
            "show" => UriKind::Show,
            "episode" => UriKind::Episode,
            other => UriKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            UriKind::Track => "track",
            UriKind::Album => "album",
            UriKind::Playlist => "playlist",
            UriKind::Artist => "artist",
            UriKind::Show => "show",
            UriKind::Episode => "episode",
            UriKind::Other(tag) => tag,
            UriKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for UriKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converts a native URI or an open.spotify.com URL into `spotify:<kind>:<id>`.
///
/// Any other non-empty input comes back unchanged with [`UriKind::Unknown`].
pub fn normalize(input: &str) -> Result<(String, UriKind), UriError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(UriError::Empty);
    }

    if let Some(caps) = NATIVE_URI.captures(s) {
        return Ok((s.to_string(), UriKind::from_tag(&caps[1])));
    }

    if WEB_PREFIXES.iter().any(|p| s.starts_with(p)) {
        let url = url::Url::parse(s).map_err(|_| UriError::UnsupportedUrl(s.to_string()))?;
        // /<kind>/<id>[/...]; trailing segments and query are ignored
        let mut segments = url.path_segments().into_iter().flatten();
        if let (Some(kind), Some(id)) = (segments.next(), segments.next()) {
            if BARE_ID.is_match(id) && !kind.is_empty() {
                let kind = kind.to_ascii_lowercase();
                return Ok((format!("spotify:{kind}:{id}"), UriKind::from_tag(&kind)));
            }
        }
        return Err(UriError::UnsupportedUrl(s.to_string()));
    }

    Ok((s.to_string(), UriKind::Unknown))
}

/// Accepts a bare 22-char id, a playlist URI or a playlist URL.
pub fn playlist_id(input: &str) -> Result<String, UriError> {
    let (uri, kind) = normalize(input)?;
    if kind == UriKind::Playlist {
        return id_of(&uri).ok_or_else(|| UriError::InvalidPlaylist(input.to_string()));
    }

    let s = input.trim();
    if BARE_ID.is_match(s) {
        return Ok(s.to_string());
    }
    if s.contains("open.spotify.com") {
        return Err(UriError::NotAPlaylistUrl(s.to_string()));
    }
    Err(UriError::InvalidPlaylist(input.to_string()))
}

pub fn track_id(input: &str) -> Result<String, UriError> {
    match normalize(input)? {
        (uri, UriKind::Track) => id_of(&uri).ok_or_else(|| UriError::NotATrack(input.to_string())),
        _ => Err(UriError::NotATrack(input.to_string())),
    }
}

fn id_of(uri: &str) -> Option<String> {
    NATIVE_URI.captures(uri).map(|caps| caps[2].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_lower_cased() {
        let (uri, kind) = normalize("spotify:Track:3n3Ppam7vgaVa1iaRUc9Lp").unwrap();
        assert_eq!(uri, "spotify:Track:3n3Ppam7vgaVa1iaRUc9Lp");
        assert_eq!(kind, UriKind::Track);

        let (_, kind) = normalize("spotify:audiobook:3n3Ppam7vgaVa1iaRUc9Lp").unwrap();
        assert_eq!(kind, UriKind::Other("audiobook".into()));
        assert_eq!(kind.to_string(), "audiobook");
    }

    #[test]
    fn url_with_extra_segments_and_query() {
        let (uri, kind) =
            normalize("https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3/x?si=abc").unwrap();
        assert_eq!(uri, "spotify:album:1DFixLWuPkv3KT3TnV35m3");
        assert_eq!(kind, UriKind::Album);
    }

    #[test]
    fn short_id_url_is_rejected() {
        assert!(matches!(
            normalize("https://open.spotify.com/track/abc"),
            Err(UriError::UnsupportedUrl(_))
        ));
        assert!(matches!(
            normalize("https://open.spotify.com/"),
            Err(UriError::UnsupportedUrl(_))
        ));
    }
}
