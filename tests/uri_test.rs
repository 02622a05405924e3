use spotctl::spotify::uri::{UriError, UriKind, normalize, playlist_id, track_id};

const TRACK: &str = "3n3Ppam7vgaVa1iaRUc9Lp";
const PLAYLIST: &str = "37i9dQZF1DXcBWIGoYBM5M";

#[test]
fn test_native_uri_is_kept() {
    let (uri, kind) = normalize(&format!("  spotify:track:{TRACK} ")).unwrap();
    assert_eq!(uri, format!("spotify:track:{TRACK}"));
    assert_eq!(kind, UriKind::Track);
}

#[test]
fn test_web_url_becomes_native_uri() {
    let (uri, kind) =
        normalize(&format!("https://open.spotify.com/playlist/{PLAYLIST}?si=abcdef")).unwrap();
    assert_eq!(uri, format!("spotify:playlist:{PLAYLIST}"));
    assert_eq!(kind, UriKind::Playlist);

    let (uri, kind) = normalize(&format!("http://open.spotify.com/Episode/{TRACK}")).unwrap();
    assert_eq!(uri, format!("spotify:episode:{TRACK}"));
    assert_eq!(kind, UriKind::Episode);
}

#[test]
fn test_normalize_is_idempotent() {
    for input in [
        format!("https://open.spotify.com/track/{TRACK}"),
        format!("spotify:show:{TRACK}"),
        "daft punk around the world".to_string(),
    ] {
        let (once, kind) = normalize(&input).unwrap();
        let (twice, again) = normalize(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(kind, again);
    }
}

#[test]
fn test_free_text_is_unknown() {
    let (uri, kind) = normalize("some song name").unwrap();
    assert_eq!(uri, "some song name");
    assert_eq!(kind, UriKind::Unknown);

    // wrong id length is not a native uri
    let (_, kind) = normalize("spotify:track:short").unwrap();
    assert_eq!(kind, UriKind::Unknown);
}

#[test]
fn test_empty_input_is_rejected() {
    assert_eq!(normalize("   "), Err(UriError::Empty));
}

#[test]
fn test_playlist_id_accepts_all_forms() {
    assert_eq!(playlist_id(PLAYLIST).unwrap(), PLAYLIST);
    assert_eq!(playlist_id(&format!("spotify:playlist:{PLAYLIST}")).unwrap(), PLAYLIST);
    assert_eq!(
        playlist_id(&format!("https://open.spotify.com/playlist/{PLAYLIST}?si=1")).unwrap(),
        PLAYLIST
    );
}

#[test]
fn test_playlist_id_rejects_other_kinds() {
    assert!(matches!(
        playlist_id(&format!("https://open.spotify.com/album/{PLAYLIST}")),
        Err(UriError::NotAPlaylistUrl(_))
    ));
    assert!(matches!(
        playlist_id("my playlist"),
        Err(UriError::InvalidPlaylist(_))
    ));
}

#[test]
fn test_track_id() {
    assert_eq!(track_id(&format!("spotify:track:{TRACK}")).unwrap(), TRACK);
    assert_eq!(
        track_id(&format!("https://open.spotify.com/track/{TRACK}")).unwrap(),
        TRACK
    );
    assert!(matches!(
        track_id(&format!("spotify:album:{TRACK}")),
        Err(UriError::NotATrack(_))
    ));
    assert!(matches!(track_id("hello"), Err(UriError::NotATrack(_))));
}
