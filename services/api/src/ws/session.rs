//! Manages the WebSocket connection lifecycle for the session host.

use super::protocol::{ClientMessage, ServerMessage};
use crate::{models::TurnResponse, state::AppState};
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Sends the initial snapshot, then runs the connection loop until the client leaves.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    let span = tracing::info_span!("ws_session", %connection_id);

    async move {
        info!("New WebSocket connection.");
        let (mut socket_tx, socket_rx) = socket.split();

        // Subscribe before taking the snapshot so no update falls in between.
        let updates = state.store.subscribe();
        let initialized = {
            let session = state.session.lock().await;
            ServerMessage::Initialized {
                active_skill: session.active_skill().into(),
                transcript: session.transcript().entries().iter().map(Into::into).collect(),
                mock_state: state.store.read().await,
            }
        };
        if send_msg(&mut socket_tx, initialized).await.is_err() {
            error!("Failed to send Initialized message to client.");
            return;
        }

        if let Err(e) = run_session(state, socket_tx, socket_rx, updates).await {
            error!(error = ?e, "WebSocket session terminated with error.");
        }
        info!("WebSocket connection closed.");
    }
    .instrument(span)
    .await
}

/// The main event loop for an open connection.
///
/// Client messages drive turns; store updates are forwarded as they arrive,
/// including edits made by an operator through the REST API.
async fn run_session(
    state: Arc<AppState>,
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut socket_rx: SplitStream<WebSocket>,
    mut updates: tokio::sync::broadcast::Receiver<concierge_core::MockState>,
) -> Result<()> {
    loop {
        tokio::select! {
            msg_result = socket_rx.next() => {
                let Some(msg_result) = msg_result else {
                    info!("Client stream ended.");
                    break;
                };
                match msg_result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(msg) => {
                            let reply = handle_client_message(&state, msg).await;
                            send_msg(&mut socket_tx, reply).await?;
                        }
                        Err(e) => {
                            warn!(error = %e, "Ignoring unparseable client message.");
                            send_msg(&mut socket_tx, ServerMessage::Error {
                                message: format!("Invalid message: {e}"),
                            }).await?;
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!("Client sent close frame. Shutting down session.");
                        break;
                    }
                    Ok(Message::Binary(_)) => warn!("Ignoring binary message."),
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Err(e) => {
                        error!("Error receiving from client WebSocket: {:?}", e);
                        break;
                    }
                }
            },
            update = updates.recv() => {
                let mock_state = match update {
                    Ok(mock_state) => mock_state,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "State updates lagged; sending latest snapshot.");
                        state.store.read().await
                    }
                    Err(RecvError::Closed) => break,
                };
                send_msg(&mut socket_tx, ServerMessage::StateUpdate { mock_state }).await?;
            },
        }
    }
    Ok(())
}

async fn handle_client_message(state: &AppState, msg: ClientMessage) -> ServerMessage {
    match msg {
        ClientMessage::UserMessage { text } => {
            let text = text.trim();
            if text.is_empty() {
                return ServerMessage::Error {
                    message: "text must not be empty".to_string(),
                };
            }
            let outcome = state.session.lock().await.send_utterance(text).await;
            let response = TurnResponse::from(&outcome);
            ServerMessage::TurnComplete {
                reply: response.reply,
                transcript_append: response.transcript_append,
                skill_now_active: response.skill_now_active,
            }
        }
        ClientMessage::SelectSkill { skill } => {
            let mut session = state.session.lock().await;
            session.select_skill(skill.into());
            ServerMessage::SkillSelected {
                active_skill: session.active_skill().into(),
            }
        }
        ClientMessage::Reset => {
            state.session.lock().await.reset();
            ServerMessage::SessionReset
        }
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
