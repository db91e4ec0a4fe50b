//! HTTP endpoint handlers. These are thin wrappers that forward to the engine.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::StoredAttempt;
use crate::error::EngineError;
use crate::progress::ProgressReport;
use crate::protocol::*;
use crate::state::AppState;

const DEFAULT_RECOMMENDATIONS: usize = 3;
const MAX_RECOMMENDATIONS: usize = 20;

/// Engine failures plus the one host-level lookup that can miss.
#[derive(Debug)]
pub enum ApiError {
  Engine(EngineError),
  UnknownChallenge(String),
}

impl From<EngineError> for ApiError {
  fn from(e: EngineError) -> Self { ApiError::Engine(e) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, kind, error) = match self {
      ApiError::Engine(e) => {
        let status = match e {
          EngineError::DataUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
          EngineError::NoActiveCandidates { .. } => StatusCode::NOT_FOUND,
          EngineError::InvalidState(_) | EngineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, e.kind().to_string(), e.to_string())
      }
      ApiError::UnknownChallenge(id) => (StatusCode::NOT_FOUND, "unknown_challenge".to_string(), format!("Unknown challengeId: {}", id)),
    };
    (status, Json(ErrorOut { error, kind })).into_response()
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state), fields(%user_id))]
pub async fn http_get_challenge(
  State(state): State<Arc<AppState>>,
  Path(user_id): Path<String>,
) -> Result<Json<DailyChallengeOut>, ApiError> {
  let sel = state.selection.daily(&user_id, Utc::now()).await?;
  info!(target: "selection", %user_id, id = %sel.challenge.id, origin = ?sel.origin, "HTTP daily challenge served");
  Ok(Json(DailyChallengeOut::from(&sel)))
}

#[instrument(level = "info", skip(state), fields(%user_id, count = ?q.count))]
pub async fn http_get_recommendations(
  State(state): State<Arc<AppState>>,
  Path(user_id): Path<String>,
  Query(q): Query<RecommendQuery>,
) -> Result<Json<RecommendationsOut>, ApiError> {
  let count = q.count.unwrap_or(DEFAULT_RECOMMENDATIONS).min(MAX_RECOMMENDATIONS);
  let list = state.selection.recommend(&user_id, count, Utc::now()).await?;
  Ok(Json(RecommendationsOut { challenges: list.iter().map(to_out).collect() }))
}

#[instrument(level = "info", skip(state), fields(%user_id))]
pub async fn http_get_progress(
  State(state): State<Arc<AppState>>,
  Path(user_id): Path<String>,
) -> Result<Json<ProgressReport>, ApiError> {
  let report = state.progress.analyze_progress(&user_id, Utc::now()).await?;
  info!(target: "engine", %user_id, trend = ?report.trend, ready = report.ready_for_advanced, "HTTP progress served");
  Ok(Json(report))
}

/// Append an attempt. Type, difficulty, estimate and viewpoints are copied
/// from the published challenge so history stays self-describing.
#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, challenge_id = %body.challenge_id))]
pub async fn http_post_attempt(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AttemptIn>,
) -> Result<Json<AttemptOut>, ApiError> {
  let ch = state
    .store
    .get_candidate(&body.challenge_id)
    .await
    .ok_or_else(|| ApiError::UnknownChallenge(body.challenge_id.clone()))?;

  let id = Uuid::new_v4().to_string();
  state
    .store
    .record_attempt(StoredAttempt {
      id: id.clone(),
      user_id: body.user_id.clone(),
      challenge_id: ch.id.clone(),
      challenge_type: ch.challenge_type.as_str().into(),
      difficulty: ch.difficulty.as_str().into(),
      correct: body.correct,
      time_spent_seconds: body.time_spent_seconds,
      estimated_seconds: Some(ch.estimated_seconds),
      viewpoints: ch.viewpoints.iter().map(|v| v.as_str().to_string()).collect(),
      submitted_at: Utc::now(),
    })
    .await;
  info!(target: "engine", user_id = %body.user_id, challenge_id = %ch.id, correct = body.correct, "HTTP attempt recorded");
  Ok(Json(AttemptOut { id }))
}
