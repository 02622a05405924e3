use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::{
    spotify::{ApiRequest, Client, SpotifyError},
    types::{Device, DevicesResponse, PlayRequest, PlaybackState, User},
};

/// Statuses the player endpoints return on success.
const PLAYER_OK: &[u16] = &[200, 202, 204];

/// Outcome of matching a device selector against the visible devices.
///
/// `devices` is always the full list so callers can show what is available
/// when nothing matched.
#[derive(Debug, Clone, Default)]
pub struct DeviceMatch {
    pub device: Option<Device>,
    pub devices: Vec<Device>,
}

impl Client {
    /// Cheap authenticated round trip, used to verify credentials.
    pub async fn ping(&self, cancel: &CancellationToken) -> Result<(), SpotifyError> {
        self.execute(cancel, ApiRequest::get("/v1/me")).await
    }

    pub async fn me(&self, cancel: &CancellationToken) -> Result<User, SpotifyError> {
        self.call::<User>(cancel, ApiRequest::get("/v1/me"))
            .await?
            .ok_or_else(|| SpotifyError::Auth("empty /v1/me response".into()))
    }

    /// Lists all Spotify Connect devices visible to the user.
    pub async fn devices(&self, cancel: &CancellationToken) -> Result<Vec<Device>, SpotifyError> {
        let response = self
            .call::<DevicesResponse>(cancel, ApiRequest::get("/v1/me/player/devices"))
            .await?;
        Ok(response.map(|r| r.devices).unwrap_or_default())
    }

    /// Resolves a device by exact id first, then by case-insensitive name.
    ///
    /// A name shared by several devices resolves to nothing; the caller should
    /// ask for the id instead.
    pub async fn resolve_device(
        &self,
        cancel: &CancellationToken,
        selector: &str,
    ) -> Result<DeviceMatch, SpotifyError> {
        let devices = self.devices(cancel).await?;
        Ok(DeviceMatch {
            device: match_device(&devices, selector),
            devices,
        })
    }

    /// Current playback, or `None` when nothing is playing (204).
    pub async fn playback_state(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<PlaybackState>, SpotifyError> {
        let state = self
            .call::<PlaybackState>(cancel, ApiRequest::get("/v1/me/player").expect(&[200, 204]))
            .await?;
        Ok(state.filter(|s| !s.device.id.is_empty() || !s.device.name.is_empty()))
    }

    pub async fn transfer_playback(
        &self,
        cancel: &CancellationToken,
        device_id: &str,
        play: bool,
    ) -> Result<(), SpotifyError> {
        let request = ApiRequest::put("/v1/me/player")
            .json(json!({ "device_ids": [device_id], "play": play }))
            .expect(PLAYER_OK);
        self.execute(cancel, request).await
    }

    pub async fn play(
        &self,
        cancel: &CancellationToken,
        device_id: &str,
        body: &PlayRequest,
    ) -> Result<(), SpotifyError> {
        let request = ApiRequest::put("/v1/me/player/play")
            .query("device_id", device_id)
            .json(serde_json::to_value(body)?)
            .expect(PLAYER_OK);
        self.execute(cancel, request).await
    }

    pub async fn pause(
        &self,
        cancel: &CancellationToken,
        device_id: Option<&str>,
    ) -> Result<(), SpotifyError> {
        let request = with_device(ApiRequest::put("/v1/me/player/pause"), device_id);
        self.execute(cancel, request).await
    }

    pub async fn next(
        &self,
        cancel: &CancellationToken,
        device_id: Option<&str>,
    ) -> Result<(), SpotifyError> {
        let request = with_device(ApiRequest::post("/v1/me/player/next"), device_id);
        self.execute(cancel, request).await
    }

    pub async fn previous(
        &self,
        cancel: &CancellationToken,
        device_id: Option<&str>,
    ) -> Result<(), SpotifyError> {
        let request = with_device(ApiRequest::post("/v1/me/player/previous"), device_id);
        self.execute(cancel, request).await
    }

    /// Sets the volume in percent; values above 100 are clamped.
    pub async fn volume(
        &self,
        cancel: &CancellationToken,
        device_id: Option<&str>,
        percent: u8,
    ) -> Result<(), SpotifyError> {
        let request = ApiRequest::put("/v1/me/player/volume")
            .query("volume_percent", percent.min(100));
        self.execute(cancel, with_device(request, device_id)).await
    }
}

fn with_device(request: ApiRequest, device_id: Option<&str>) -> ApiRequest {
    let request = request.expect(PLAYER_OK);
    match device_id {
        Some(id) => request.query("device_id", id),
        None => request,
    }
}

/// Picks the device with id `selector`, else the only device whose name
/// matches it ignoring case and surrounding whitespace.
pub fn match_device(devices: &[Device], selector: &str) -> Option<Device> {
    if let Some(d) = devices.iter().find(|d| d.id == selector) {
        return Some(d.clone());
    }

    let wanted = selector.trim().to_lowercase();
    let mut named = devices
        .iter()
        .filter(|d| d.name.trim().to_lowercase() == wanted);
    match (named.next(), named.next()) {
        (Some(d), None) => Some(d.clone()),
        _ => None,
    }
}
