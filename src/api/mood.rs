use crate::api::middleware::RequireAuth;
use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::{
    AnalyzeMoodRequest, LogMoodRequest, PlaylistCreationResult, RecommendationRequest,
    SentimentResult, Track,
};
use crate::services::mood_mapper::{TrackSelectionStrategy, DEFAULT_TRACK_LIMIT};
use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

const DEFAULT_PLAYLIST_DESCRIPTION: &str = "Made by Moodwave to match how you feel";

#[derive(Debug, Serialize)]
struct RecommendationResponse {
    strategy: TrackSelectionStrategy,
    tracks: Vec<Track>,
}

#[derive(Debug, Serialize)]
struct MoodPlaylistResponse {
    #[serde(flatten)]
    playlist: PlaylistCreationResult,
    strategy: TrackSelectionStrategy,
    tracks: Vec<Track>,
}

pub fn mood_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/log", post(log_mood))
        .route("/recommendations", post(recommendations))
        .route("/playlist", post(create_mood_playlist))
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    RequireAuth(_claims): RequireAuth,
    Json(req): Json<AnalyzeMoodRequest>,
) -> Result<Json<SentimentResult>> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let result = state.sentiment.analyze(&req.text).await?;
    Ok(Json(result))
}

async fn log_mood(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
    Json(req): Json<LogMoodRequest>,
) -> Result<Json<Value>> {
    let entry = state.journal.log(&claims.sub, &req).await?;
    Ok(Json(json!({ "id": entry.id, "logged": true })))
}

fn plan(state: &AppState, req: &RecommendationRequest) -> Result<TrackSelectionStrategy> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    req.sentiment
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    Ok(state.mapper.map(
        &req.sentiment,
        req.source,
        req.shape,
        req.limit.unwrap_or(DEFAULT_TRACK_LIMIT),
    ))
}

async fn recommendations(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
    Json(req): Json<RecommendationRequest>,
) -> Result<Json<RecommendationResponse>> {
    let strategy = plan(&state, &req)?;
    let spotify = state.spotify()?;

    let tracks = spotify.recommender.select(&claims.sub, &strategy).await?;
    Ok(Json(RecommendationResponse { strategy, tracks }))
}

/// The whole flow in one request: plan, select, create, populate.
async fn create_mood_playlist(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
    Json(req): Json<RecommendationRequest>,
) -> Result<Json<MoodPlaylistResponse>> {
    let strategy = plan(&state, &req)?;
    let spotify = state.spotify()?;

    let mut session = spotify.service.open_session(&claims.sub).await?;
    let tracks = spotify.recommender.select_with(&mut session, &strategy).await?;
    if tracks.is_empty() {
        return Err(AppError::NotFound("No tracks matched this mood".to_string()));
    }

    let name = req
        .name
        .clone()
        .unwrap_or_else(|| default_playlist_name(&req.sentiment));
    let description = req
        .description
        .clone()
        .unwrap_or_else(|| DEFAULT_PLAYLIST_DESCRIPTION.to_string());
    let uris: Vec<String> = tracks.iter().map(|t| t.uri.clone()).collect();

    let playlist = spotify
        .playlists
        .create_and_populate_with(&mut session, &name, &description, &uris)
        .await?;

    Ok(Json(MoodPlaylistResponse {
        playlist,
        strategy,
        tracks,
    }))
}

fn default_playlist_name(sentiment: &SentimentResult) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(4).collect();
    format!("{} mood {}", sentiment.category().label(), suffix)
}
