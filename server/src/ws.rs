//! Realtime speech over `/ws`.
//!
//! A client sends `{"type": "prompt", "text": ..., "id": ...}` and receives
//! `audio_start`, raw PCM binary frames, and `audio_end`, all tagged with the
//! prompt's id. Synthesis failures surface as an `error` frame; the
//! connection stays open for the next prompt either way.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tts_core::{ClientMessage, ServerMessage};

use crate::state::AppState;
use crate::validation::validate_tts_text;

pub async fn stream_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("speech stream opened");
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(raw) => match serde_json::from_str(raw.as_str()) {
                Ok(ClientMessage::Prompt { text, id }) => {
                    if stream_prompt(&mut socket, &state, &id, &text).await.is_err() {
                        break;
                    }
                }
                Err(e) => debug!("ignoring unreadable frame: {e}"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
    info!("speech stream closed");
}

/// Synthesize one prompt and stream it out. `Err` means the socket itself
/// failed and the connection loop should end.
async fn stream_prompt(
    socket: &mut WebSocket,
    state: &AppState,
    id: &str,
    text: &str,
) -> Result<(), axum::Error> {
    if let Err(e) = validate_tts_text(text) {
        let frame = ServerMessage::Error {
            id: id.to_string(),
            error: e.to_string(),
        };
        return send_control(socket, &frame).await;
    }

    let voice_id = state.registry().active_voice();
    let start = ServerMessage::AudioStart { id: id.to_string() };
    send_control(socket, &start).await?;

    // Chunks are forwarded as they come off the synthesizer rather than
    // after the whole utterance is ready.
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(100);
    let producer = tokio::spawn({
        let tts = state.tts.clone();
        let text = text.to_string();
        async move { tts.stream(&voice_id, &text, tx).await }
    });

    let mut sent_bytes = 0usize;
    while let Some(chunk) = rx.recv().await {
        sent_bytes += chunk.len();
        socket.send(Message::Binary(chunk.into())).await?;
    }

    let outcome = match producer.await {
        Ok(Ok(())) => {
            info!(id, bytes = sent_bytes, "synthesis stream complete");
            ServerMessage::AudioEnd { id: id.to_string() }
        }
        Ok(Err(e)) => {
            warn!(id, "synthesis failed: {e}");
            ServerMessage::Error {
                id: id.to_string(),
                error: e.to_string(),
            }
        }
        Err(e) => {
            warn!(id, "synthesis task failed: {e}");
            ServerMessage::Error {
                id: id.to_string(),
                error: "synthesis task failed".to_string(),
            }
        }
    };
    send_control(socket, &outcome).await
}

async fn send_control(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(payload) => socket.send(Message::Text(payload.into())).await,
        Err(e) => {
            warn!("could not encode control frame: {e}");
            Ok(())
        }
    }
}
