use crate::api::middleware::RequireAuth;
use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::{
    CreatePlaylistRequest, Device, PlayRequest, PlaylistCreationResult, SpotifyProfile, Track,
};
use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use validator::Validate;

const TIME_RANGES: &[&str] = &["short_term", "medium_term", "long_term"];

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageParams {
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TopTracksParams {
    limit: Option<u32>,
    time_range: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ConnectionStatus {
    connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    spotify_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct LikedTracksPage {
    items: Vec<Track>,
    limit: u32,
    offset: u32,
    has_more: bool,
}

#[derive(Debug, Serialize)]
struct Devices {
    devices: Vec<Device>,
    has_active_device: bool,
}

#[derive(Debug, Serialize)]
struct LikedTracks {
    total: usize,
    tracks: Vec<Track>,
}

pub fn spotify_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth-url", get(auth_url))
        .route("/callback", get(callback))
        .route("/status", get(status))
        .route("/profile", get(profile))
        .route("/liked-tracks", get(liked_tracks))
        .route("/liked-tracks/all", get(all_liked_tracks))
        .route("/top-tracks", get(top_tracks))
        .route("/search", get(search))
        .route("/playlist", post(create_playlist))
        .route("/devices", get(devices))
        .route("/play", post(play))
        .route("/disconnect", delete(disconnect))
}

async fn auth_url(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
) -> Result<Json<Value>> {
    let spotify = state.spotify()?;
    let oauth_state = state.auth_service.issue_oauth_state(&claims.sub)?;
    let url = spotify.service.tokens().authorize_url(&oauth_state)?;

    Ok(Json(json!({ "url": url })))
}

/// Browser lands here from the consent screen, so failures render a page instead of JSON.
async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match complete_connection(&state, params).await {
        Ok(()) => Redirect::to(&format!(
            "{}/?spotify=connected",
            state.client_url.trim_end_matches('/')
        ))
        .into_response(),
        Err(e) => {
            tracing::warn!("Spotify connection failed: {}", e);
            (e.status(), error_page(&e.to_string(), &state.client_url)).into_response()
        }
    }
}

async fn complete_connection(state: &AppState, params: CallbackParams) -> Result<()> {
    if let Some(error) = params.error {
        return Err(AppError::Validation(format!("Spotify authorization was denied: {}", error)));
    }
    let spotify = state.spotify()?;
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("Missing authorization code".to_string()))?;
    let oauth_state = params
        .state
        .ok_or_else(|| AppError::Validation("Missing authorization state".to_string()))?;

    let user_id = state.auth_service.verify_oauth_state(&oauth_state)?;
    spotify.service.connect(&user_id, &code).await?;
    Ok(())
}

fn error_page(message: &str, client_url: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Spotify connection failed</title></head>
<body>
<h1>Could not connect Spotify</h1>
<p>{}</p>
<p><a href="{}">Back to the app</a></p>
</body>
</html>"#,
        escape_html(message),
        escape_html(client_url)
    ))
}

fn escape_html(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#39;".to_string(),
            c => c.to_string(),
        })
        .collect()
}

async fn status(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
) -> Result<Json<ConnectionStatus>> {
    let spotify = state.spotify()?;
    let credential = spotify.service.tokens().credential(&claims.sub).await?;

    Ok(Json(match credential {
        Some(c) => ConnectionStatus {
            connected: true,
            spotify_user_id: Some(c.spotify_user_id),
            display_name: c.spotify_display_name,
            expires_at: Some(c.expires_at),
        },
        None => ConnectionStatus {
            connected: false,
            spotify_user_id: None,
            display_name: None,
            expires_at: None,
        },
    }))
}

async fn profile(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
) -> Result<Json<SpotifyProfile>> {
    let mut session = state.spotify()?.service.open_session(&claims.sub).await?;
    Ok(Json(session.current_user().await?))
}

async fn liked_tracks(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
    Query(params): Query<PageParams>,
) -> Result<Json<LikedTracksPage>> {
    let limit = params.limit.unwrap_or(20).clamp(1, 50);
    let offset = params.offset.unwrap_or(0);

    let mut session = state.spotify()?.service.open_session(&claims.sub).await?;
    let page = session.saved_tracks(limit, offset).await?;
    let items = page.items.ok_or_else(|| {
        AppError::UpstreamMalformed(format!("saved tracks page at offset {} has no item list", offset))
    })?;

    Ok(Json(LikedTracksPage {
        items,
        limit,
        offset,
        has_more: page.has_more,
    }))
}

async fn all_liked_tracks(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
) -> Result<Json<LikedTracks>> {
    let tracks = state.spotify()?.library.fetch_all(&claims.sub).await?;

    Ok(Json(LikedTracks {
        total: tracks.len(),
        tracks,
    }))
}

async fn top_tracks(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
    Query(params): Query<TopTracksParams>,
) -> Result<Json<Vec<Track>>> {
    let limit = params.limit.unwrap_or(20).clamp(1, 50);
    let time_range = params.time_range.unwrap_or_else(|| "medium_term".to_string());
    if !TIME_RANGES.contains(&time_range.as_str()) {
        return Err(AppError::Validation(format!(
            "time_range must be one of {}",
            TIME_RANGES.join(", ")
        )));
    }

    let mut session = state.spotify()?.service.open_session(&claims.sub).await?;
    Ok(Json(session.top_tracks(limit, &time_range).await?))
}

async fn search(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Track>>> {
    let query = params
        .q
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::Validation("Query parameter 'q' is required".to_string()))?;
    let limit = params.limit.unwrap_or(20).clamp(1, 50);

    let mut session = state.spotify()?.service.open_session(&claims.sub).await?;
    Ok(Json(session.search_tracks(&query, limit).await?))
}

async fn create_playlist(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
    Json(req): Json<CreatePlaylistRequest>,
) -> Result<Json<PlaylistCreationResult>> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let result = state
        .spotify()?
        .playlists
        .create_and_populate(&claims.sub, req.name.trim(), &req.description, &req.track_uris)
        .await?;

    Ok(Json(result))
}

async fn devices(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
) -> Result<Json<Devices>> {
    let mut session = state.spotify()?.service.open_session(&claims.sub).await?;
    let devices = session.devices().await?;

    Ok(Json(Devices {
        has_active_device: devices.iter().any(|d| d.is_active),
        devices,
    }))
}

async fn play(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
    Json(req): Json<PlayRequest>,
) -> Result<Json<Value>> {
    let uri = req.uri.trim();
    if !uri.starts_with("spotify:track:") || uri.len() == "spotify:track:".len() {
        return Err(AppError::Validation(format!("Invalid track URI: {}", uri)));
    }
    let device_id = req.device_id.as_deref().filter(|id| !id.is_empty());

    let mut session = state.spotify()?.service.open_session(&claims.sub).await?;
    session.play(uri, device_id).await?;
    tracing::info!("Started {} for user {}", uri, claims.sub);

    Ok(Json(json!({ "playing": true, "uri": uri })))
}

async fn disconnect(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
) -> Result<Json<Value>> {
    state.spotify()?.service.tokens().disconnect(&claims.sub).await?;
    Ok(Json(json!({ "disconnected": true })))
}
