use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tabled::Tabled;

/// Client credentials plus the long-lived refresh token.
///
/// An absent `client_secret` marks a public (PKCE) client. The refresh token
/// is absent while the login flow is minting one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Option<String>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.filter(|s| !s.trim().is_empty()),
            refresh_token: refresh_token.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }
}

/// Short-lived access token as cached in memory and on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,
    pub expires_at: DateTime<Utc>,
}

/// Query parameters captured from the authorization server's redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackResult {
    pub code: String,
    pub state: String,
    pub error: String,
}

/// PKCE verifier and its S256 challenge (RFC 7636).
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthCodeExchangeResult {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, rename = "is_private_session")]
    pub is_private: bool,
    #[serde(default)]
    pub is_restricted: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub volume_percent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Tabled)]
pub struct DeviceTableRow {
    pub active: String,
    pub name: String,
    #[tabled(rename = "type")]
    pub kind: String,
    pub id: String,
    pub volume: String,
}

impl From<&Device> for DeviceTableRow {
    fn from(d: &Device) -> Self {
        Self {
            active: if d.is_active { "*".into() } else { String::new() },
            name: d.name.clone(),
            kind: d.kind.clone(),
            id: d.id.clone(),
            volume: format!("{}%", d.volume_percent),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybackState {
    #[serde(default, deserialize_with = "null_as_default")]
    pub device: Device,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub progress_ms: u64,
    #[serde(default, rename = "shuffle_state")]
    pub shuffle: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub repeat_state: String,
    #[serde(default)]
    pub item: Option<Track>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub album: Album,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

impl Track {
    pub fn display_artists(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.uri
        } else {
            &self.name
        }
    }
}

#[derive(Tabled)]
pub struct TrackTableRow {
    pub name: String,
    pub artists: String,
    pub uri: String,
}

impl From<&Track> for TrackTableRow {
    fn from(t: &Track) -> Self {
        Self {
            name: t.display_name().to_string(),
            artists: t.display_artists(),
            uri: t.uri.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Album {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uri: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artist {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchTracksResponse {
    pub tracks: TrackPage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackPage {
    #[serde(default)]
    pub items: Vec<Track>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
}

/// Body of `PUT /v1/me/player/play`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_uri: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub uris: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Playlist {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uri: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistPage {
    #[serde(default)]
    pub items: Vec<Playlist>,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistDetails {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

/// Body of `PUT /v1/playlists/{id}`; unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistDetailsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddTracksResult {
    #[serde(default)]
    pub snapshot_id: String,
}
