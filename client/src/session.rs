//! The audio streaming session: one task owning one WebSocket to the twin
//! server, speaking at most one reply at a time.
//!
//! Callers hand text to [`SessionHandle::request_playback`] and watch the
//! event channel. While a job is in flight further requests are rejected,
//! not queued. The connection opens lazily on the first request and is
//! dropped on any transport fault; the next request dials again.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use tts_core::protocol::{ClientMessage, ServerMessage};
use tts_core::{concat_chunks, decode_pcm16le, SAMPLE_RATE};

use crate::error::SessionError;
use crate::output::AudioOutput;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type WsError = tokio_tungstenite::tungstenite::Error;

/// Where an in-flight job is in its lifecycle. Terminal outcomes are not
/// states; they are reported as events and the job slot is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    /// Prompt sent, waiting for the server to confirm with `audio_start`.
    Pending,
    /// Chunks for this job are being collected.
    Streaming,
    /// All chunks received, payload being decoded.
    Decoding,
    /// Samples handed to the output, waiting for it to drain.
    Playing,
}

#[derive(Debug)]
struct Job {
    id: String,
    text: String,
    state: JobState,
    chunks: Vec<Vec<u8>>,
}

/// What the session reports back to its owner.
#[derive(Debug)]
pub enum SessionEvent {
    /// A playback request was taken on and given this job id.
    Accepted { id: String },
    /// A request arrived while another job was in flight and was dropped.
    Busy { text: String },
    /// A request was dropped because the session has no audio output.
    Skipped { reason: String },
    /// Decoded audio was handed to the output device.
    Playing { id: String, samples: usize },
    /// Playback drained; the session is idle again.
    Done { id: String },
    /// The job ended early; the session is idle again.
    Failed { id: String, error: SessionError },
}

enum Command {
    Speak { text: String },
    Shutdown,
}

/// Cheap cloneable handle feeding the session task.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Ask the session to speak `text`. Rejections and failures come back on
    /// the event channel, never through this call.
    pub fn request_playback(&self, text: impl Into<String>) {
        let _ = self.commands.send(Command::Speak { text: text.into() });
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

pub struct Session {
    ws_url: String,
    open_timeout: Duration,
    output: Option<Arc<dyn AudioOutput>>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
    sink: Option<WsSink>,
    source: Option<WsSource>,
    job: Option<Job>,
    playback_done: Option<oneshot::Receiver<()>>,
    next_seq: u64,
}

impl Session {
    /// Start the session task. `output` of `None` runs the session text-only;
    /// every playback request is then skipped up front.
    pub fn spawn(
        ws_url: impl Into<String>,
        open_timeout: Duration,
        output: Option<Arc<dyn AudioOutput>>,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let session = Session {
            ws_url: ws_url.into(),
            open_timeout,
            output,
            commands: command_rx,
            events: event_tx,
            sink: None,
            source: None,
            job: None,
            playback_done: None,
            next_seq: 0,
        };
        tokio::spawn(session.run());
        (
            SessionHandle {
                commands: command_tx,
            },
            event_rx,
        )
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Speak { text }) => self.handle_speak(text).await,
                    Some(Command::Shutdown) | None => break,
                },
                frame = next_frame(&mut self.source) => self.handle_frame(frame),
                outcome = playback_finished(&mut self.playback_done) => {
                    self.handle_playback_end(outcome);
                }
            }
        }
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.close().await;
        }
    }

    async fn handle_speak(&mut self, text: String) {
        if self.job.is_some() {
            debug!("playback in progress, dropping request");
            self.emit(SessionEvent::Busy { text });
            return;
        }
        if self.output.is_none() {
            self.emit(SessionEvent::Skipped {
                reason: "audio output disabled".into(),
            });
            return;
        }

        let id = self.next_job_id();
        self.job = Some(Job {
            id: id.clone(),
            text: text.clone(),
            state: JobState::Pending,
            chunks: Vec::new(),
        });
        self.emit(SessionEvent::Accepted { id: id.clone() });

        if self.source.is_none() {
            if let Err(error) = self.connect().await {
                self.fail_active(error);
                return;
            }
        }

        let prompt = ClientMessage::Prompt { text, id };
        let payload = match serde_json::to_string(&prompt) {
            Ok(payload) => payload,
            Err(e) => {
                self.fail_active(SessionError::TransportError(e.to_string()));
                return;
            }
        };
        match self.sink.as_mut() {
            Some(sink) => {
                if let Err(e) = sink.send(Message::Text(payload.into())).await {
                    self.drop_transport();
                    self.fail_active(SessionError::TransportError(e.to_string()));
                }
            }
            None => self.fail_active(SessionError::TransportError(
                "connection not available".into(),
            )),
        }
    }

    async fn connect(&mut self) -> Result<(), SessionError> {
        debug!(url = %self.ws_url, "opening stream connection");
        let (ws, _response) =
            match tokio::time::timeout(self.open_timeout, connect_async(self.ws_url.as_str()))
                .await
            {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => return Err(SessionError::TransportError(e.to_string())),
                Err(_) => return Err(SessionError::TransportTimeout),
            };
        let (sink, source) = ws.split();
        self.sink = Some(sink);
        self.source = Some(source);
        Ok(())
    }

    fn handle_frame(&mut self, frame: Option<Result<Message, WsError>>) {
        match frame {
            Some(Ok(Message::Text(raw))) => match serde_json::from_str::<ServerMessage>(raw.as_str())
            {
                Ok(message) => self.dispatch(message),
                Err(e) => debug!(error = %e, "ignoring unreadable control message"),
            },
            Some(Ok(Message::Binary(bytes))) => self.on_audio_chunk(bytes.to_vec()),
            Some(Ok(Message::Close(_))) | None => {
                self.on_transport_closed("connection closed".into());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => self.on_transport_closed(e.to_string()),
        }
    }

    /// The single dispatch point for server control messages. Anything not
    /// matching the active job is stale and gets dropped here.
    fn dispatch(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::AudioStart { id } => match self.job.as_mut() {
                Some(job) if job.id == id && job.state == JobState::Pending => {
                    debug!(%id, "server started streaming");
                    job.state = JobState::Streaming;
                }
                _ => debug!(%id, "ignoring audio_start for inactive job"),
            },
            ServerMessage::AudioEnd { id } => self.on_audio_end(id),
            ServerMessage::Error { id, error } => {
                if self.job.as_ref().is_some_and(|job| job.id == id) {
                    self.fail_active(SessionError::ServerReportedError(error));
                } else {
                    debug!(%id, "ignoring error for inactive job");
                }
            }
        }
    }

    fn on_audio_chunk(&mut self, bytes: Vec<u8>) {
        match self.job.as_mut() {
            Some(job) if job.state == JobState::Streaming => job.chunks.push(bytes),
            Some(job) if job.state == JobState::Pending => {
                debug!(id = %job.id, "dropping audio received before audio_start");
            }
            _ => debug!("dropping stray audio chunk"),
        }
    }

    fn on_audio_end(&mut self, id: String) {
        let ready = self.job.as_ref().is_some_and(|job| {
            job.id == id && matches!(job.state, JobState::Pending | JobState::Streaming)
        });
        if !ready {
            debug!(%id, "ignoring audio_end for inactive job");
            return;
        }

        let payload = match self.job.as_mut() {
            Some(job) => {
                job.state = JobState::Decoding;
                concat_chunks(&std::mem::take(&mut job.chunks))
            }
            None => return,
        };
        let samples = match decode_pcm16le(&payload) {
            Ok(samples) => samples,
            Err(e) => {
                self.fail_active(e.into());
                return;
            }
        };

        let Some(output) = self.output.clone() else {
            self.fail_active(SessionError::UnsupportedEnvironment(
                "audio output disabled".into(),
            ));
            return;
        };
        let sample_count = samples.len();
        match output.play(samples, SAMPLE_RATE) {
            Ok(done) => {
                self.playback_done = Some(done);
                if let Some(job) = self.job.as_mut() {
                    job.state = JobState::Playing;
                }
                debug!(%id, samples = sample_count, "playback started");
                self.emit(SessionEvent::Playing {
                    id,
                    samples: sample_count,
                });
            }
            Err(e) => self.fail_active(SessionError::UnsupportedEnvironment(e.to_string())),
        }
    }

    fn handle_playback_end(&mut self, outcome: Result<(), oneshot::error::RecvError>) {
        self.playback_done = None;
        match outcome {
            Ok(()) => {
                if let Some(job) = self.job.take() {
                    debug!(id = %job.id, "playback finished");
                    self.emit(SessionEvent::Done { id: job.id });
                }
            }
            Err(_) => self.fail_active(SessionError::UnsupportedEnvironment(
                "playback stopped before finishing".into(),
            )),
        }
    }

    /// The transport died. Jobs still waiting on server audio fail; a job
    /// already playing no longer needs the connection and runs to completion.
    fn on_transport_closed(&mut self, reason: String) {
        self.drop_transport();
        let awaiting_audio = self
            .job
            .as_ref()
            .is_some_and(|job| matches!(job.state, JobState::Pending | JobState::Streaming));
        if awaiting_audio {
            self.fail_active(SessionError::TransportError(reason));
        }
    }

    fn fail_active(&mut self, error: SessionError) {
        self.playback_done = None;
        if let Some(job) = self.job.take() {
            warn!(id = %job.id, text_len = job.text.len(), %error, "playback request failed");
            self.emit(SessionEvent::Failed { id: job.id, error });
        }
    }

    fn drop_transport(&mut self) {
        self.sink = None;
        self.source = None;
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Millisecond timestamp with a sequence suffix so two requests in the
    /// same millisecond still get distinct ids.
    fn next_job_id(&mut self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        self.next_seq += 1;
        format!("{millis}-{}", self.next_seq)
    }
}

async fn next_frame(source: &mut Option<WsSource>) -> Option<Result<Message, WsError>> {
    match source.as_mut() {
        Some(source) => source.next().await,
        None => std::future::pending().await,
    }
}

async fn playback_finished(
    done: &mut Option<oneshot::Receiver<()>>,
) -> Result<(), oneshot::error::RecvError> {
    match done.as_mut() {
        Some(done) => done.await,
        None => std::future::pending().await,
    }
}
