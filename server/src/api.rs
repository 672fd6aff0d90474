//! Minigame REST endpoints served from the ledger.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::ledger::LedgerError;
use crate::protocol::{SaveScoreRequest, SaveScoreResponse, StartGameResponse, UserStatsResponse};
use crate::session::UserId;
use crate::ws::AppState;

/// Error body: `{ "success": false, "error": ..., "error_code": ... }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match err {
            LedgerError::NoLivesLeft(_) => StatusCode::CONFLICT,
            LedgerError::UnknownUser(_) => StatusCode::NOT_FOUND,
            LedgerError::InvalidScore => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.to_string(), err.code())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": self.message,
            "error_code": self.code,
        });
        (self.status, Json(body)).into_response()
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/minigame/start-game/{user_id}", post(start_game))
        .route("/minigame/save-score", post(save_score))
        .route("/minigame/user-stats/{user_id}", get(user_stats))
}

async fn start_game(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<StartGameResponse>, ApiError> {
    let vidas_restantes = state.ledger.lock().await.start_game(user_id)?;
    tracing::info!(user = user_id, remaining = vidas_restantes, "Attempt consumed");
    Ok(Json(StartGameResponse { vidas_restantes }))
}

async fn save_score(
    State(state): State<AppState>,
    Json(req): Json<SaveScoreRequest>,
) -> Result<Json<SaveScoreResponse>, ApiError> {
    let receipt = state.ledger.lock().await.save_score(req.user_id, req.score)?;
    tracing::info!(
        user = req.user_id,
        score = req.score,
        coins = receipt.coins_awarded,
        "Score saved"
    );
    Ok(Json(SaveScoreResponse {
        monedas_ganadas: receipt.coins_awarded,
        total_monedas: receipt.total_coins,
        nuevo_record: receipt.new_best,
    }))
}

async fn user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Json<UserStatsResponse> {
    let record = state.ledger.lock().await.user_stats(user_id);
    Json(UserStatsResponse {
        vidas: record.lives,
        monedas: record.coins,
        mejor_score: record.best_score,
    })
}
