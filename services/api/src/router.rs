//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        ActiveSkill, BridgeAction, BridgeMessagePayload, BridgeResponse, BridgeRole, BridgeTurn,
        EntryRole, ErrorResponse, SelectSkillPayload, SendMessagePayload, SessionView,
        TranscriptEntryView, TurnResponse,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::send_message,
        handlers::get_session,
        handlers::get_transcript,
        handlers::get_mocks,
        handlers::put_mocks,
        handlers::select_skill,
        handlers::reset_session,
        handlers::bridge_message,
    ),
    components(
        schemas(
            SendMessagePayload, TurnResponse, SessionView, TranscriptEntryView, SelectSkillPayload,
            BridgeMessagePayload, BridgeResponse, BridgeAction, BridgeTurn, BridgeRole,
            ActiveSkill, EntryRole, ErrorResponse
        )
    ),
    tags(
        (name = "Concierge API", description = "Skill-routed support agent running against an editable backend mock")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/session", get(handlers::get_session))
        .route("/session/messages", post(handlers::send_message))
        .route("/session/transcript", get(handlers::get_transcript))
        .route(
            "/session/mocks",
            get(handlers::get_mocks).put(handlers::put_mocks),
        )
        .route("/session/skill", put(handlers::select_skill))
        .route("/session/reset", post(handlers::reset_session))
        .route("/bridge/messages", post(handlers::bridge_message))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .fallback(handlers::not_found)
}
