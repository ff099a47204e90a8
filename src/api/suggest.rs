//! Tag suggestion endpoint
//!
//! - POST /api/tags/suggest - Suggest tags for a task description

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::api::middleware::{ApiError, ApiJson, AppState};
use crate::api::responses::SuggestResponse;

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    pub description: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/tags/suggest", post(suggest_tags))
}

async fn suggest_tags(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SuggestRequest>,
) -> Result<Json<SuggestResponse>, ApiError> {
    let tags = state.suggester.suggest(&body.description).await?;
    Ok(Json(SuggestResponse { tags }))
}
