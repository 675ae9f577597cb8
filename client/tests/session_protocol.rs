use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use client::error::SessionError;
use client::output::{AudioOutput, OutputError};
use client::session::{Session, SessionEvent};
use tts_core::encode_pcm16le;

type ServerWs = WebSocketStream<TcpStream>;

/// Serve one scripted WebSocket connection on an ephemeral port.
async fn spawn_server<F, Fut>(handler: F) -> SocketAddr
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                handler(ws).await;
            }
        }
    });
    addr
}

async fn read_prompt(ws: &mut ServerWs) -> serde_json::Value {
    while let Some(Ok(message)) = ws.next().await {
        if let Message::Text(raw) = message {
            return serde_json::from_str(raw.as_str()).unwrap();
        }
    }
    panic!("connection ended before a prompt arrived");
}

async fn send_json(ws: &mut ServerWs, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn send_audio(ws: &mut ServerWs, bytes: Vec<u8>) {
    ws.send(Message::Binary(bytes.into())).await.unwrap();
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("session ended unexpectedly")
}

/// Captures playback sample counts instead of touching a device, completing
/// each playback immediately.
#[derive(Default)]
struct RecordingOutput {
    plays: Mutex<Vec<usize>>,
}

impl RecordingOutput {
    fn plays(&self) -> Vec<usize> {
        self.plays.lock().unwrap().clone()
    }
}

impl AudioOutput for RecordingOutput {
    fn play(
        &self,
        samples: Vec<f32>,
        _sample_rate: u32,
    ) -> Result<oneshot::Receiver<()>, OutputError> {
        self.plays.lock().unwrap().push(samples.len());
        let (done_tx, done_rx) = oneshot::channel();
        let _ = done_tx.send(());
        Ok(done_rx)
    }
}

#[tokio::test]
async fn streamed_chunks_are_assembled_into_one_playback() {
    let (prompt_tx, mut prompt_rx) = mpsc::unbounded_channel();
    let addr = spawn_server(move |mut ws| async move {
        let prompt = read_prompt(&mut ws).await;
        let id = prompt["id"].as_str().unwrap().to_string();
        let _ = prompt_tx.send(prompt);
        send_json(&mut ws, json!({"type": "audio_start", "id": id})).await;
        send_audio(&mut ws, encode_pcm16le(&[0.25; 40])).await;
        send_audio(&mut ws, encode_pcm16le(&[-0.5; 24])).await;
        send_json(&mut ws, json!({"type": "audio_end", "id": id})).await;
        let _ = ws.next().await;
    })
    .await;

    let output = Arc::new(RecordingOutput::default());
    let (session, mut events) = Session::spawn(
        format!("ws://{addr}/ws"),
        Duration::from_secs(2),
        Some(output.clone()),
    );

    session.request_playback("hello");

    let SessionEvent::Accepted { id } = next_event(&mut events).await else {
        panic!("expected the request to be accepted");
    };
    let prompt = prompt_rx.recv().await.unwrap();
    assert_eq!(prompt["type"], "prompt");
    assert_eq!(prompt["text"], "hello");
    assert_eq!(prompt["id"], id.as_str());

    match next_event(&mut events).await {
        SessionEvent::Playing { id: playing, samples } => {
            assert_eq!(playing, id);
            assert_eq!(samples, 64);
        }
        other => panic!("expected playback to start, got {other:?}"),
    }
    match next_event(&mut events).await {
        SessionEvent::Done { id: done } => assert_eq!(done, id),
        other => panic!("expected playback to finish, got {other:?}"),
    }
    assert_eq!(output.plays(), vec![64]);
}

#[tokio::test]
async fn chunks_before_audio_start_are_discarded() {
    let addr = spawn_server(|mut ws| async move {
        let prompt = read_prompt(&mut ws).await;
        let id = prompt["id"].as_str().unwrap().to_string();
        send_audio(&mut ws, encode_pcm16le(&[0.9; 10])).await;
        send_json(&mut ws, json!({"type": "audio_start", "id": id})).await;
        send_audio(&mut ws, encode_pcm16le(&[0.1; 20])).await;
        send_json(&mut ws, json!({"type": "audio_end", "id": id})).await;
        let _ = ws.next().await;
    })
    .await;

    let output = Arc::new(RecordingOutput::default());
    let (session, mut events) = Session::spawn(
        format!("ws://{addr}/ws"),
        Duration::from_secs(2),
        Some(output.clone()),
    );

    session.request_playback("hello");
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Accepted { .. }
    ));
    match next_event(&mut events).await {
        SessionEvent::Playing { samples, .. } => assert_eq!(samples, 20),
        other => panic!("expected playback, got {other:?}"),
    }
    assert!(matches!(next_event(&mut events).await, SessionEvent::Done { .. }));
    assert_eq!(output.plays(), vec![20]);
}

#[tokio::test]
async fn a_second_request_while_busy_is_rejected_without_disturbing_the_first() {
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let addr = spawn_server(move |mut ws| async move {
        let prompt = read_prompt(&mut ws).await;
        let id = prompt["id"].as_str().unwrap().to_string();
        send_json(&mut ws, json!({"type": "audio_start", "id": id})).await;
        send_audio(&mut ws, encode_pcm16le(&[0.1; 30])).await;
        release_rx.await.unwrap();
        send_audio(&mut ws, encode_pcm16le(&[0.2; 34])).await;
        send_json(&mut ws, json!({"type": "audio_end", "id": id})).await;
        let _ = ws.next().await;
    })
    .await;

    let output = Arc::new(RecordingOutput::default());
    let (session, mut events) = Session::spawn(
        format!("ws://{addr}/ws"),
        Duration::from_secs(2),
        Some(output.clone()),
    );

    session.request_playback("first");
    let SessionEvent::Accepted { id: first } = next_event(&mut events).await else {
        panic!("expected the first request to be accepted");
    };

    // The server is holding the stream open, so the first job cannot have
    // finished when this lands.
    session.request_playback("second");
    match next_event(&mut events).await {
        SessionEvent::Busy { text } => assert_eq!(text, "second"),
        other => panic!("expected the second request to be rejected, got {other:?}"),
    }

    release_tx.send(()).unwrap();
    match next_event(&mut events).await {
        SessionEvent::Playing { id, samples } => {
            assert_eq!(id, first);
            assert_eq!(samples, 64);
        }
        other => panic!("expected the first job to play, got {other:?}"),
    }
    match next_event(&mut events).await {
        SessionEvent::Done { id } => assert_eq!(id, first),
        other => panic!("expected the first job to finish, got {other:?}"),
    }
    assert_eq!(output.plays(), vec![64]);
}

#[tokio::test]
async fn open_timeout_fails_the_job_and_frees_the_slot() {
    // Accept the TCP connection but never answer the websocket handshake.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _held = listener.accept().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let output = Arc::new(RecordingOutput::default());
    let (session, mut events) = Session::spawn(
        format!("ws://{addr}/ws"),
        Duration::from_millis(200),
        Some(output.clone()),
    );

    session.request_playback("hello");
    let SessionEvent::Accepted { id: first } = next_event(&mut events).await else {
        panic!("expected the request to be accepted");
    };
    match next_event(&mut events).await {
        SessionEvent::Failed { id, error } => {
            assert_eq!(id, first);
            assert!(matches!(error, SessionError::TransportTimeout));
        }
        other => panic!("expected a timeout failure, got {other:?}"),
    }

    // The slot is free again; a new request gets a fresh id.
    session.request_playback("again");
    match next_event(&mut events).await {
        SessionEvent::Accepted { id } => assert_ne!(id, first),
        other => panic!("expected the next request to be accepted, got {other:?}"),
    }
    assert!(output.plays().is_empty());
}

#[tokio::test]
async fn server_error_mid_stream_discards_chunks_and_recovers() {
    let addr = spawn_server(|mut ws| async move {
        let prompt = read_prompt(&mut ws).await;
        let id = prompt["id"].as_str().unwrap().to_string();
        send_json(&mut ws, json!({"type": "audio_start", "id": id})).await;
        send_audio(&mut ws, encode_pcm16le(&[0.3; 50])).await;
        send_json(&mut ws, json!({"type": "error", "id": id, "error": "synthesis failed"})).await;

        // The session stays connected; serve the retry on the same stream.
        let prompt = read_prompt(&mut ws).await;
        let id = prompt["id"].as_str().unwrap().to_string();
        send_json(&mut ws, json!({"type": "audio_start", "id": id})).await;
        send_audio(&mut ws, encode_pcm16le(&[0.3; 16])).await;
        send_json(&mut ws, json!({"type": "audio_end", "id": id})).await;
        let _ = ws.next().await;
    })
    .await;

    let output = Arc::new(RecordingOutput::default());
    let (session, mut events) = Session::spawn(
        format!("ws://{addr}/ws"),
        Duration::from_secs(2),
        Some(output.clone()),
    );

    session.request_playback("hello");
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Accepted { .. }
    ));
    match next_event(&mut events).await {
        SessionEvent::Failed { error, .. } => match error {
            SessionError::ServerReportedError(message) => {
                assert_eq!(message, "synthesis failed")
            }
            other => panic!("expected a server-reported failure, got {other}"),
        },
        other => panic!("expected the job to fail, got {other:?}"),
    }
    assert!(output.plays().is_empty());

    session.request_playback("again");
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Accepted { .. }
    ));
    match next_event(&mut events).await {
        SessionEvent::Playing { samples, .. } => assert_eq!(samples, 16),
        other => panic!("expected the retry to play, got {other:?}"),
    }
    assert!(matches!(next_event(&mut events).await, SessionEvent::Done { .. }));
    assert_eq!(output.plays(), vec![16]);
}

#[tokio::test]
async fn control_frames_for_stale_ids_are_ignored() {
    let addr = spawn_server(|mut ws| async move {
        let prompt = read_prompt(&mut ws).await;
        let id = prompt["id"].as_str().unwrap().to_string();
        send_json(&mut ws, json!({"type": "audio_start", "id": "0-stale"})).await;
        send_json(&mut ws, json!({"type": "error", "id": "0-stale", "error": "old job"})).await;
        send_json(&mut ws, json!({"type": "audio_end", "id": "0-stale"})).await;
        send_json(&mut ws, json!({"type": "audio_start", "id": id})).await;
        send_audio(&mut ws, encode_pcm16le(&[0.5; 12])).await;
        send_json(&mut ws, json!({"type": "audio_end", "id": id})).await;
        let _ = ws.next().await;
    })
    .await;

    let output = Arc::new(RecordingOutput::default());
    let (session, mut events) = Session::spawn(
        format!("ws://{addr}/ws"),
        Duration::from_secs(2),
        Some(output.clone()),
    );

    session.request_playback("hello");
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Accepted { .. }
    ));
    match next_event(&mut events).await {
        SessionEvent::Playing { samples, .. } => assert_eq!(samples, 12),
        other => panic!("expected playback despite stale frames, got {other:?}"),
    }
    assert!(matches!(next_event(&mut events).await, SessionEvent::Done { .. }));
}

#[tokio::test]
async fn malformed_audio_fails_decoding() {
    let addr = spawn_server(|mut ws| async move {
        let prompt = read_prompt(&mut ws).await;
        let id = prompt["id"].as_str().unwrap().to_string();
        send_json(&mut ws, json!({"type": "audio_start", "id": id})).await;
        send_audio(&mut ws, vec![1, 2, 3]).await;
        send_json(&mut ws, json!({"type": "audio_end", "id": id})).await;
        let _ = ws.next().await;
    })
    .await;

    let output = Arc::new(RecordingOutput::default());
    let (session, mut events) = Session::spawn(
        format!("ws://{addr}/ws"),
        Duration::from_secs(2),
        Some(output.clone()),
    );

    session.request_playback("hello");
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Accepted { .. }
    ));
    match next_event(&mut events).await {
        SessionEvent::Failed { error, .. } => {
            assert!(matches!(error, SessionError::DecodeError(_)))
        }
        other => panic!("expected a decode failure, got {other:?}"),
    }
    assert!(output.plays().is_empty());
}

#[tokio::test]
async fn transport_close_mid_stream_fails_the_job_and_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // First connection dies mid-stream.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let prompt = read_prompt(&mut ws).await;
        let id = prompt["id"].as_str().unwrap().to_string();
        send_json(&mut ws, json!({"type": "audio_start", "id": id})).await;
        send_audio(&mut ws, encode_pcm16le(&[0.2; 8])).await;
        drop(ws);

        // The next request dials again and completes.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let prompt = read_prompt(&mut ws).await;
        let id = prompt["id"].as_str().unwrap().to_string();
        send_json(&mut ws, json!({"type": "audio_start", "id": id})).await;
        send_audio(&mut ws, encode_pcm16le(&[0.2; 44])).await;
        send_json(&mut ws, json!({"type": "audio_end", "id": id})).await;
        let _ = ws.next().await;
    });

    let output = Arc::new(RecordingOutput::default());
    let (session, mut events) = Session::spawn(
        format!("ws://{addr}/ws"),
        Duration::from_secs(2),
        Some(output.clone()),
    );

    session.request_playback("hello");
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Accepted { .. }
    ));
    match next_event(&mut events).await {
        SessionEvent::Failed { error, .. } => {
            assert!(matches!(error, SessionError::TransportError(_)))
        }
        other => panic!("expected a transport failure, got {other:?}"),
    }

    session.request_playback("again");
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Accepted { .. }
    ));
    match next_event(&mut events).await {
        SessionEvent::Playing { samples, .. } => assert_eq!(samples, 44),
        other => panic!("expected the reconnected job to play, got {other:?}"),
    }
    assert!(matches!(next_event(&mut events).await, SessionEvent::Done { .. }));
    assert_eq!(output.plays(), vec![44]);
}

#[tokio::test]
async fn sessions_without_audio_output_skip_requests() {
    let (session, mut events) =
        Session::spawn("ws://127.0.0.1:9/ws", Duration::from_millis(100), None);

    session.request_playback("hello");
    match next_event(&mut events).await {
        SessionEvent::Skipped { reason } => assert_eq!(reason, "audio output disabled"),
        other => panic!("expected the request to be skipped, got {other:?}"),
    }
}
