use crate::api::middleware::RequireAuth;
use crate::api::AppState;
use crate::error::Result;
use crate::models::SetUsernameRequest;
use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn user_routes() -> Router<Arc<AppState>> {
    Router::new().route("/set-username", post(set_username))
}

async fn set_username(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
    Json(req): Json<SetUsernameRequest>,
) -> Result<Json<Value>> {
    let username = state.users.set_username(&claims.sub, &req).await?;
    Ok(Json(json!({ "username": username, "updated": true })))
}
