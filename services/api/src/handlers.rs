//! Axum Handlers for the REST API
//!
//! Session host operations (send an utterance, inspect and edit the mocks,
//! pick a skill, reset) plus the stateless bridge endpoint. Handlers carry
//! `utoipa` annotations for the OpenAPI document.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use concierge_core::{
    MockStore, SessionController,
    mock_state::{MockState, MockStateError},
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    models::{
        BridgeMessagePayload, BridgeResponse, ErrorResponse, SelectSkillPayload,
        SendMessagePayload, SessionView, TranscriptEntryView, TurnResponse,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unprocessable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Unprocessable(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse { message }),
            )
                .into_response(),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Malformed JSON is a bad request; a well-formed document that breaks the
/// mock schema or its invariants is unprocessable.
fn rejected_edit(err: MockStateError) -> ApiError {
    match err {
        MockStateError::InvalidJson(_) => ApiError::BadRequest(err.to_string()),
        _ => ApiError::Unprocessable(err.to_string()),
    }
}

fn mock_json(state: &MockState) -> Result<serde_json::Value, ApiError> {
    Ok(serde_json::to_value(state)?)
}

async fn session_view(
    session: &SessionController,
    store: &MockStore,
) -> Result<SessionView, ApiError> {
    Ok(SessionView {
        active_skill: session.active_skill().into(),
        transcript: session.transcript().entries().iter().map(Into::into).collect(),
        mock_state: mock_json(&store.read().await)?,
    })
}

/// Send a user utterance and run one full turn.
#[utoipa::path(
    post,
    path = "/session/messages",
    request_body = SendMessagePayload,
    responses(
        (status = 200, description = "Turn processed; `reply` is null if the generation backend failed", body = TurnResponse),
        (status = 400, description = "Empty message", body = ErrorResponse)
    )
)]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<Json<TurnResponse>, ApiError> {
    let text = payload.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }

    let mut session = state.session.lock().await;
    let outcome = session.send_utterance(text).await;
    if outcome.failed() {
        warn!("Turn finished without a reply");
    }
    Ok(Json(TurnResponse::from(&outcome)))
}

/// Get the active skill, the full transcript and the current mock state.
#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Session snapshot", body = SessionView),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session.lock().await;
    Ok(Json(session_view(&session, &state.store).await?))
}

/// Get the conversation transcript.
#[utoipa::path(
    get,
    path = "/session/transcript",
    responses(
        (status = 200, description = "Transcript entries in order", body = [TranscriptEntryView])
    )
)]
pub async fn get_transcript(State(state): State<Arc<AppState>>) -> Json<Vec<TranscriptEntryView>> {
    let session = state.session.lock().await;
    Json(session.transcript().entries().iter().map(Into::into).collect())
}

/// Get the current mock state.
#[utoipa::path(
    get,
    path = "/session/mocks",
    responses(
        (status = 200, description = "Current mock state", body = serde_json::Value),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_mocks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(mock_json(&state.store.read().await)?))
}

/// Replace the mock state. The body is validated before anything is stored;
/// a rejected edit leaves the previous state in place.
#[utoipa::path(
    put,
    path = "/session/mocks",
    request_body(content = serde_json::Value, content_type = "application/json"),
    responses(
        (status = 200, description = "Mock state replaced", body = serde_json::Value),
        (status = 400, description = "Body is not valid JSON", body = ErrorResponse),
        (status = 422, description = "Body violates the mock schema", body = ErrorResponse)
    )
)]
pub async fn put_mocks(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Operator edits go straight to the store and may land mid-turn.
    let updated = state
        .store
        .replace_from_json(&body)
        .await
        .map_err(rejected_edit)?;
    Ok(Json(mock_json(&updated)?))
}

/// Pin a skill manually, or return to the orchestrator.
#[utoipa::path(
    put,
    path = "/session/skill",
    request_body = SelectSkillPayload,
    responses(
        (status = 200, description = "Skill selected", body = SessionView),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn select_skill(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SelectSkillPayload>,
) -> Result<Json<SessionView>, ApiError> {
    let mut session = state.session.lock().await;
    session.select_skill(payload.skill.into());
    Ok(Json(session_view(&session, &state.store).await?))
}

/// Clear the transcript and return control to the orchestrator.
#[utoipa::path(
    post,
    path = "/session/reset",
    responses(
        (status = 204, description = "Session reset")
    )
)]
pub async fn reset_session(State(state): State<Arc<AppState>>) -> StatusCode {
    state.session.lock().await.reset();
    info!("Session reset via API");
    StatusCode::NO_CONTENT
}

/// Generate a reply for an external channel without touching the session or the mocks.
#[utoipa::path(
    post,
    path = "/bridge/messages",
    request_body = BridgeMessagePayload,
    responses(
        (status = 200, description = "Generated reply and the action it requested, if any", body = BridgeResponse),
        (status = 400, description = "Empty message", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn bridge_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BridgeMessagePayload>,
) -> Result<Json<BridgeResponse>, ApiError> {
    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }

    let snapshot = state.store.read().await;
    let history = payload.history.into_iter().map(Into::into).collect();
    let preview = state
        .previewer
        .preview(
            payload.text.trim(),
            payload.agent.map(Into::into),
            history,
            &snapshot,
        )
        .await?;
    Ok(Json(preview.into()))
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("No such route".to_string())
}
