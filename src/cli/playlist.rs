use std::io::BufRead;

use regex::Regex;
use serde::Serialize;

use crate::{
    Res,
    cli::{App, ExitError, print_json},
    info,
    spotify::uri::{self, UriKind},
    success,
    types::{PlaylistDetailsUpdate, Track},
    warning,
};

pub const DEFAULT_CLEANUP_PREFIX: &str = "spotctl-test:";

pub async fn playlist_create(
    app: &App,
    name: &str,
    public: bool,
    description: &str,
    json: bool,
) -> Res<()> {
    if name.trim().is_empty() {
        return Err(ExitError::usage("missing --name").into());
    }
    let client = app.client().await?;
    let playlist = client
        .create_playlist(&app.cancel, name, public, description)
        .await?;

    if json {
        return print_json(&playlist);
    }
    success!("Created playlist: {} ({})", playlist.name, playlist.uri);
    Ok(())
}

/// Adds explicit track URIs, checking each one exists first.
pub async fn playlist_add(app: &App, playlist: &str, tracks: &[String], json: bool) -> Res<()> {
    if tracks.is_empty() {
        return Err(ExitError::usage("playlist add requires at least one track URI").into());
    }
    let playlist_id = uri::playlist_id(playlist).map_err(|e| ExitError::usage(e.to_string()))?;

    let mut uris = Vec::with_capacity(tracks.len());
    let mut ids = Vec::with_capacity(tracks.len());
    for t in tracks {
        let (normalized, kind) = uri::normalize(t).map_err(|e| ExitError::usage(e.to_string()))?;
        if kind != UriKind::Track {
            return Err(ExitError::usage(format!("playlist add only supports track URIs: {t}")).into());
        }
        ids.push(uri::track_id(&normalized).map_err(|e| ExitError::usage(e.to_string()))?);
        uris.push(normalized);
    }

    let client = app.client().await?;
    for (id, track_uri) in ids.iter().zip(&uris) {
        let track = client.get_track(&app.cancel, id).await?;
        if track.id.is_empty() {
            return Err(ExitError::usage(format!("invalid track uri (not found): {track_uri}")).into());
        }
    }

    let result = client
        .add_tracks_to_playlist(&app.cancel, &playlist_id, &uris)
        .await?;
    if json {
        return print_json(&result);
    }
    success!("Added {} track(s). Snapshot: {}", uris.len(), result.snapshot_id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ResolvedQuery {
    query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    track: Option<Track>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ResolvedQuery {
    fn miss(query: &str, error: impl Into<String>) -> Self {
        Self {
            query: query.to_string(),
            track: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct AddQueryOutput {
    playlist: String,
    tsv: bool,
    resolved: Vec<ResolvedQuery>,
    added_uris: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    snapshot_id: String,
    misses: usize,
    added: usize,
    total: usize,
}

/// Reads one query per line; with `tsv`, lines are `<artist>\t<track>` and
/// become fielded Spotify queries.
pub fn read_queries<R: BufRead>(reader: R, tsv: bool) -> Res<Vec<String>> {
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if !tsv {
            out.push(line.trim().to_string());
            continue;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        let Some((artist, track)) = line.split_once('\t') else {
            return Err(ExitError::usage(format!(
                "expected TSV line: <artist>\\t<track>, got: {line:?}"
            ))
            .into());
        };
        let (artist, track) = (artist.trim(), track.trim());
        if artist.is_empty() || track.is_empty() {
            return Err(ExitError::usage(format!("invalid TSV line (empty field): {line:?}")).into());
        }
        out.push(format!("track:{track:?} artist:{artist:?}"));
    }
    if out.is_empty() {
        return Err(ExitError::usage("stdin provided no queries").into());
    }
    Ok(out)
}

/// Resolves each query to its top track and adds the hits in one go.
///
/// Misses are reported, not fatal.
pub async fn playlist_add_query(
    app: &App,
    playlist: &str,
    queries: Vec<String>,
    tsv: bool,
    limit: u32,
    json: bool,
) -> Res<()> {
    if queries.is_empty() {
        return Err(ExitError::usage(
            "playlist add-query requires at least one query (or pass --stdin)",
        )
        .into());
    }
    let playlist_id = uri::playlist_id(playlist).map_err(|e| ExitError::usage(e.to_string()))?;
    let client = app.client().await?;

    let mut resolved = Vec::new();
    let mut candidates = Vec::new();
    for query in queries.iter().map(|q| q.trim()).filter(|q| !q.is_empty()) {
        let items = match client.search_tracks(&app.cancel, query, limit).await {
            Ok(items) => items,
            Err(e) if e.is_cancelled() => return Err(e.into()),
            Err(e) => {
                resolved.push(ResolvedQuery::miss(query, e.to_string()));
                continue;
            }
        };
        let Some(picked) = items.into_iter().next() else {
            resolved.push(ResolvedQuery::miss(query, "no results"));
            continue;
        };
        match uri::track_id(&picked.uri) {
            Ok(id) => {
                candidates.push((id, picked.uri.clone()));
                resolved.push(ResolvedQuery {
                    query: query.to_string(),
                    track: Some(picked),
                    error: None,
                });
            }
            Err(e) => resolved.push(ResolvedQuery::miss(query, e.to_string())),
        }
    }

    let mut valid = Vec::new();
    for (id, track_uri) in candidates {
        match client.get_track(&app.cancel, &id).await {
            Ok(track) if !track.id.is_empty() => valid.push(track_uri),
            Err(e) if e.is_cancelled() => return Err(e.into()),
            _ => tracing::debug!(uri = %track_uri, "dropping unverifiable track"),
        }
    }

    let mut out = AddQueryOutput {
        playlist: playlist_id.clone(),
        tsv,
        misses: resolved.iter().filter(|r| r.track.is_none()).count(),
        added: valid.len(),
        total: queries.len(),
        resolved,
        added_uris: Vec::new(),
        snapshot_id: String::new(),
    };
    if !valid.is_empty() {
        let result = client
            .add_tracks_to_playlist(&app.cancel, &playlist_id, &valid)
            .await?;
        out.snapshot_id = result.snapshot_id;
    }
    out.added_uris = valid;

    if json {
        return print_json(&out);
    }
    success!("Added {}/{} track(s).", out.added, out.total);
    if out.misses > 0 {
        warning!(
            "{} query(ies) had no results or errors. Re-run with --json for details.",
            out.misses
        );
    }
    Ok(())
}

pub async fn playlist_privacy(app: &App, playlist: &str, public: bool, json: bool) -> Res<()> {
    let playlist_id = uri::playlist_id(playlist).map_err(|e| ExitError::usage(e.to_string()))?;
    let client = app.client().await?;

    client
        .update_playlist_details(
            &app.cancel,
            &playlist_id,
            &PlaylistDetailsUpdate {
                public: Some(public),
                ..Default::default()
            },
        )
        .await?;
    let details = client.playlist_details(&app.cancel, &playlist_id).await?;

    if json {
        return print_json(&details);
    }
    let state = if details.public == Some(true) {
        "public"
    } else {
        "private"
    };
    success!("Playlist is now {}: {} ({})", state, details.name, details.uri);
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct CleanupOptions {
    pub prefix: String,
    pub regex: Option<String>,
    pub apply: bool,
    pub yes: bool,
}

#[derive(Debug, Serialize)]
struct CleanupMatch {
    id: String,
    name: String,
    uri: String,
}

#[derive(Debug, Serialize, Default)]
struct CleanupOutput {
    #[serde(skip_serializing_if = "String::is_empty")]
    prefix: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    regex: String,
    apply: bool,
    matched: Vec<CleanupMatch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    deleted_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    error_deleted: Vec<String>,
}

/// Finds playlists by name prefix or regex and, with `--apply --yes`,
/// unfollows them.
pub async fn playlist_cleanup(app: &App, options: &CleanupOptions, json: bool) -> Res<()> {
    if options.apply && !options.yes {
        return Err(ExitError::usage("refusing to delete without --yes (use --apply --yes)").into());
    }
    let pattern = options.regex.as_deref().map(str::trim).filter(|r| !r.is_empty());
    let regex = pattern
        .map(Regex::new)
        .transpose()
        .map_err(|e| ExitError::usage(format!("invalid --regex: {e}")))?;

    let client = app.client().await?;
    let playlists = client.my_playlists(&app.cancel).await?;

    let mut out = CleanupOutput {
        prefix: options.prefix.clone(),
        regex: pattern.unwrap_or_default().to_string(),
        apply: options.apply,
        ..Default::default()
    };
    out.matched = playlists
        .into_iter()
        .filter(|p| {
            (!options.prefix.is_empty() && p.name.starts_with(&options.prefix))
                || regex.as_ref().is_some_and(|r| r.is_match(&p.name))
        })
        .map(|p| CleanupMatch {
            id: p.id,
            name: p.name,
            uri: p.uri,
        })
        .collect();

    if options.apply {
        for m in &out.matched {
            let Ok(id) = uri::playlist_id(&m.id) else {
                out.skipped_ids.push(m.id.clone());
                continue;
            };
            match client.unfollow_playlist(&app.cancel, &id).await {
                Ok(()) => out.deleted_ids.push(m.id.clone()),
                Err(e) if e.is_cancelled() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(playlist = %m.id, error = %e, "unfollow failed");
                    out.error_deleted.push(m.id.clone());
                }
            }
        }
    }

    if json {
        return print_json(&out);
    }
    if out.matched.is_empty() {
        println!("No playlists matched.");
        return Ok(());
    }
    if !options.apply {
        info!(
            "Matched {} playlist(s). Re-run with --apply --yes to delete.",
            out.matched.len()
        );
        for m in &out.matched {
            println!("- {} :: {}", m.id, m.name);
        }
        return Ok(());
    }
    success!("Deleted {} playlist(s).", out.deleted_ids.len());
    if !out.error_deleted.is_empty() {
        warning!(
            "failed to delete {} playlist(s) (rate limit or permissions)",
            out.error_deleted.len()
        );
    }
    Ok(())
}
