use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::{
    spotify::{ApiRequest, Client, SpotifyError},
    types::{AddTracksResult, Playlist, PlaylistDetails, PlaylistDetailsUpdate, PlaylistPage},
};

/// Page size for `GET /v1/me/playlists`.
pub const PLAYLIST_PAGE_SIZE: u32 = 50;

/// Stop paging after this many pages (2500 playlists).
pub const MAX_PLAYLIST_PAGES: u32 = 50;

/// Most items `POST /v1/playlists/{id}/items` accepts per request.
pub const MAX_ITEMS_PER_ADD: usize = 100;

const PAGE_FIELDS: &str = "items(id,name,uri),total,limit,offset,next";
const DETAIL_FIELDS: &str = "id,name,uri,public,description";

impl Client {
    pub async fn create_playlist(
        &self,
        cancel: &CancellationToken,
        name: &str,
        public: bool,
        description: &str,
    ) -> Result<Playlist, SpotifyError> {
        let request = ApiRequest::post("/v1/me/playlists")
            .json(json!({ "name": name, "public": public, "description": description }))
            .expect(&[200, 201]);
        self.call::<Playlist>(cancel, request)
            .await?
            .ok_or_else(|| SpotifyError::NotFound("empty create playlist response".into()))
    }

    /// Appends track URIs to a playlist.
    ///
    /// Batches of more than 100 are split into several requests; the snapshot
    /// of the last request is returned.
    pub async fn add_tracks_to_playlist(
        &self,
        cancel: &CancellationToken,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<AddTracksResult, SpotifyError> {
        let path = format!("/v1/playlists/{}/items", encode_segment(playlist_id));
        let mut result = AddTracksResult::default();
        for chunk in uris.chunks(MAX_ITEMS_PER_ADD) {
            let request = ApiRequest::post(path.as_str())
                .json(json!({ "uris": chunk }))
                .expect(&[200, 201]);
            if let Some(r) = self.call::<AddTracksResult>(cancel, request).await? {
                result = r;
            }
        }
        Ok(result)
    }

    /// Lists every playlist the user owns or follows.
    ///
    /// Pages through `/v1/me/playlists` fifty at a time and stops when the
    /// server reports no next page, when `offset` passes `total`, or after
    /// [`MAX_PLAYLIST_PAGES`] pages.
    pub async fn my_playlists(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Playlist>, SpotifyError> {
        let mut out = Vec::new();
        let mut offset = 0u32;

        for _ in 0..MAX_PLAYLIST_PAGES {
            let request = ApiRequest::get("/v1/me/playlists")
                .query("limit", PLAYLIST_PAGE_SIZE)
                .query("offset", offset)
                .query("fields", PAGE_FIELDS);
            let page = self
                .call::<PlaylistPage>(cancel, request)
                .await?
                .unwrap_or_default();

            let received = page.items.len() as u32;
            out.extend(page.items);
            let step = if page.limit > 0 { page.limit } else { received };
            offset = page.offset + step;

            if page.next.as_deref().is_none_or(str::is_empty) || offset >= page.total || step == 0 {
                break;
            }
        }

        tracing::debug!(count = out.len(), "fetched playlists");
        Ok(out)
    }

    /// Removes the playlist from the user's library (Spotify has no delete).
    pub async fn unfollow_playlist(
        &self,
        cancel: &CancellationToken,
        playlist_id: &str,
    ) -> Result<(), SpotifyError> {
        let path = format!("/v1/playlists/{}/followers", encode_segment(playlist_id));
        self.execute(cancel, ApiRequest::delete(path).expect(&[200, 202, 204]))
            .await
    }

    pub async fn playlist_details(
        &self,
        cancel: &CancellationToken,
        playlist_id: &str,
    ) -> Result<PlaylistDetails, SpotifyError> {
        let path = format!("/v1/playlists/{}", encode_segment(playlist_id));
        self.call::<PlaylistDetails>(cancel, ApiRequest::get(path).query("fields", DETAIL_FIELDS))
            .await?
            .ok_or_else(|| SpotifyError::NotFound(format!("playlist {playlist_id} not found")))
    }

    pub async fn update_playlist_details(
        &self,
        cancel: &CancellationToken,
        playlist_id: &str,
        update: &PlaylistDetailsUpdate,
    ) -> Result<(), SpotifyError> {
        let path = format!("/v1/playlists/{}", encode_segment(playlist_id));
        let request = ApiRequest::put(path)
            .json(serde_json::to_value(update)?)
            .expect(&[200, 202, 204]);
        self.execute(cancel, request).await
    }
}

fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_are_escaped() {
        assert_eq!(encode_segment("37i9dQZF1DXcBWIGoYBM5M"), "37i9dQZF1DXcBWIGoYBM5M");
        assert_eq!(encode_segment("a b/c"), "a%20b%2Fc");
    }
}
