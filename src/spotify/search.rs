use tokio_util::sync::CancellationToken;

use crate::{
    spotify::{ApiRequest, Client, SpotifyError},
    types::{SearchTracksResponse, Track},
};

pub const DEFAULT_SEARCH_LIMIT: u32 = 10;
pub const MAX_SEARCH_LIMIT: u32 = 50;

/// Most ids accepted by `GET /v1/tracks` in one call.
pub const MAX_TRACK_IDS: usize = 50;

#[derive(serde::Deserialize)]
struct SeveralTracks {
    #[serde(default)]
    tracks: Vec<Option<Track>>,
}

/// Clamps a user supplied limit into `1..=50`; zero means the default.
pub fn clamp_limit(limit: u32) -> u32 {
    match limit {
        0 => DEFAULT_SEARCH_LIMIT,
        n => n.min(MAX_SEARCH_LIMIT),
    }
}

impl Client {
    /// Searches the catalog for tracks.
    ///
    /// # Arguments
    ///
    /// * `query` - Free-text Spotify search query (field filters such as
    ///   `artist:` are passed through untouched)
    /// * `limit` - Result count, clamped to `1..=50`; `0` selects the default
    ///   of 10
    pub async fn search_tracks(
        &self,
        cancel: &CancellationToken,
        query: &str,
        limit: u32,
    ) -> Result<Vec<Track>, SpotifyError> {
        let request = ApiRequest::get("/v1/search")
            .query("q", query)
            .query("type", "track")
            .query("limit", clamp_limit(limit));
        let response = self.call::<SearchTracksResponse>(cancel, request).await?;
        Ok(response.map(|r| r.tracks.items).unwrap_or_default())
    }

    /// Best match for `query`; no hits is an error.
    pub async fn search_top_track(
        &self,
        cancel: &CancellationToken,
        query: &str,
    ) -> Result<Track, SpotifyError> {
        self.search_tracks(cancel, query, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SpotifyError::NotFound(format!("no search results for {query:?}")))
    }

    /// Fetches one track; an unknown id yields a default (empty) track.
    pub async fn get_track(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<Track, SpotifyError> {
        let path = format!("/v1/tracks/{id}");
        match self.call::<Track>(cancel, ApiRequest::get(path)).await {
            Ok(track) => Ok(track.unwrap_or_default()),
            Err(e) if e.status() == Some(404) => Ok(Track::default()),
            Err(e) => Err(e),
        }
    }

    /// Fetches up to 50 tracks in one call, preserving order.
    ///
    /// Unknown ids come back as default tracks so positions line up with
    /// `ids`. Ids past the 50th are ignored.
    pub async fn get_tracks(
        &self,
        cancel: &CancellationToken,
        ids: &[String],
    ) -> Result<Vec<Track>, SpotifyError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = &ids[..ids.len().min(MAX_TRACK_IDS)];
        let request = ApiRequest::get("/v1/tracks").query("ids", ids.join(","));
        let response = self.call::<SeveralTracks>(cancel, request).await?;
        Ok(response
            .map(|r| r.tracks.into_iter().map(Option::unwrap_or_default).collect())
            .unwrap_or_default())
    }
}
