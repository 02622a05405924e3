use serde::Serialize;

use crate::{
    Res,
    cli::{App, ExitError, format_devices, optional_device, print_json, require_device},
    info,
    spotify::uri::{self, UriKind},
    success,
    types::{Device, PlayRequest, Track},
};

#[derive(Serialize)]
struct DevicesOutput<'a> {
    devices: &'a [Device],
}

#[derive(Serialize, Default)]
struct StatusOutput {
    active: bool,
    is_playing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<Device>,
    #[serde(skip_serializing_if = "Option::is_none")]
    item: Option<Track>,
}

pub async fn device_list(app: &App, json: bool) -> Res<()> {
    let client = app.client().await?;
    let devices = client.devices(&app.cancel).await?;

    if json {
        return print_json(&DevicesOutput { devices: &devices });
    }
    println!("{}", format_devices(&devices));
    Ok(())
}

pub async fn status(app: &App, json: bool) -> Res<()> {
    let client = app.client().await?;
    let state = client.playback_state(&app.cancel).await?;

    let out = match &state {
        Some(st) => StatusOutput {
            active: true,
            is_playing: st.is_playing,
            progress_ms: Some(st.progress_ms).filter(|p| *p > 0),
            device: Some(st.device.clone()),
            item: st.item.clone().filter(|t| !t.uri.is_empty()),
        },
        None => StatusOutput::default(),
    };

    if json {
        return print_json(&out);
    }

    let Some(st) = state else {
        println!("No active playback.");
        return Ok(());
    };
    let verb = if st.is_playing { "Playing" } else { "Paused" };
    match out.item {
        Some(item) => println!(
            "{verb} on {}: {} - {}",
            st.device.name,
            item.display_name(),
            item.display_artists()
        ),
        None => println!("{verb} on {}", st.device.name),
    }
    Ok(())
}

pub async fn transfer(app: &App, device: &str, play: bool) -> Res<()> {
    let client = app.client().await?;
    let target = require_device(app, &client, device).await?;
    client
        .transfer_playback(&app.cancel, &target.id, play)
        .await?;
    success!("Transferred to {} (id={})", target.name, target.id);
    Ok(())
}

/// Builds the play body for a normalized URI.
pub(crate) fn play_request(uri: &str, kind: &UriKind) -> Res<PlayRequest> {
    match kind {
        UriKind::Track | UriKind::Episode => Ok(PlayRequest {
            uris: vec![uri.to_string()],
            ..Default::default()
        }),
        UriKind::Album | UriKind::Playlist | UriKind::Artist | UriKind::Show => Ok(PlayRequest {
            context_uri: Some(uri.to_string()),
            ..Default::default()
        }),
        other => Err(ExitError::usage(format!("unsupported URI kind for play: {other} ({uri})")).into()),
    }
}

/// Plays a URI, link or id; anything else is searched and the top track played.
pub async fn play(app: &App, device: &str, target: &str) -> Res<()> {
    let client = app.client().await?;
    let dev = require_device(app, &client, device).await?;

    let (mut uri, mut kind) = uri::normalize(target).map_err(|e| ExitError::usage(e.to_string()))?;
    if kind == UriKind::Unknown {
        let track = client.search_top_track(&app.cancel, target).await?;
        info!(
            "Search: {:?} -> {} - {} ({})",
            target,
            track.name,
            track.display_artists(),
            track.uri
        );
        uri = track.uri;
        kind = UriKind::Track;
    }

    let request = play_request(&uri, &kind)?;
    client.play(&app.cancel, &dev.id, &request).await?;
    success!("Play on {}: {}", dev.name, uri);
    Ok(())
}

pub async fn pause(app: &App, device: Option<&str>) -> Res<()> {
    let client = app.client().await?;
    let id = optional_device(app, &client, device).await?;
    client.pause(&app.cancel, id.as_deref()).await?;
    success!("Paused.");
    Ok(())
}

pub async fn next(app: &App, device: Option<&str>) -> Res<()> {
    let client = app.client().await?;
    let id = optional_device(app, &client, device).await?;
    client.next(&app.cancel, id.as_deref()).await?;
    success!("Next.");
    Ok(())
}

pub async fn previous(app: &App, device: Option<&str>) -> Res<()> {
    let client = app.client().await?;
    let id = optional_device(app, &client, device).await?;
    client.previous(&app.cancel, id.as_deref()).await?;
    success!("Previous.");
    Ok(())
}

pub async fn volume(app: &App, device: Option<&str>, percent: u8) -> Res<()> {
    if percent > 100 {
        return Err(ExitError::usage("volume must be an int 0-100").into());
    }
    let client = app.client().await?;
    let id = optional_device(app, &client, device).await?;
    client.volume(&app.cancel, id.as_deref(), percent).await?;
    success!("Volume set to {}%", percent);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_and_episodes_play_as_uris() {
        let req = play_request("spotify:track:3n3Ppam7vgaVa1iaRUc9Lp", &UriKind::Track).unwrap();
        assert_eq!(req.uris, vec!["spotify:track:3n3Ppam7vgaVa1iaRUc9Lp"]);
        assert!(req.context_uri.is_none());
    }

    #[test]
    fn collections_play_as_context() {
        let req = play_request("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M", &UriKind::Playlist).unwrap();
        assert_eq!(req.context_uri.as_deref(), Some("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M"));
        assert!(req.uris.is_empty());
    }

    #[test]
    fn other_kinds_are_rejected() {
        let err = play_request("spotify:user:abcdefghijklmnopqrstuv", &UriKind::Other("user".into())).unwrap_err();
        assert!(err.to_string().contains("unsupported URI kind"));
    }
}
