use std::sync::atomic::Ordering;
use std::sync::{OnceLock, PoisonError};
use std::time::Instant;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use twin_core::{pick_model, Mode};

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::{validate_agent_name, validate_chat_message, validate_tts_text};
use crate::ws::stream_ws;

#[derive(Deserialize)]
pub struct ChatRequest {
    message: String,
    mode: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    agent: String,
    response: String,
    timestamp: DateTime<Utc>,
    audio_enabled: bool,
}

#[derive(Deserialize)]
pub struct SwitchRequest {
    agent: String,
}

#[derive(Serialize)]
pub struct SwitchResponse {
    current_agent: String,
    message: String,
}

#[derive(Serialize)]
pub struct SaveResponse {
    message: String,
}

#[derive(Serialize)]
pub struct AgentsResponse {
    agents: Vec<String>,
    current_agent: String,
}

#[derive(Deserialize)]
pub struct TtsRequest {
    text: String,
}

#[derive(Serialize)]
pub struct TtsResponse {
    audio_base64: String,
    duration_ms: u64,
    sample_rate: u32,
}

/// Assemble the full application router. Routes are mounted both at the root
/// and under `/api` so browser frontends and reverse proxies can use either.
pub fn build_router(state: AppState) -> Router {
    let public_api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/agents", get(list_agents))
        .route("/chat", post(chat_endpoint))
        .route("/switch-agent", post(switch_agent_endpoint))
        .route("/save-conversation", post(save_conversation_endpoint))
        .route("/tts", post(tts_endpoint))
        .route("/ws", get(stream_ws));

    // Metrics endpoint - consider adding authentication in production
    let metrics_api = Router::new().route("/metrics", get(metrics_endpoint));

    let api = Router::new().merge(public_api).merge(metrics_api);

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .with_state(state)
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_agents(State(state): State<AppState>) -> Json<AgentsResponse> {
    let registry = state.registry();
    Json(AgentsResponse {
        agents: registry.names(),
        current_agent: registry.active_name().to_string(),
    })
}

pub async fn chat_endpoint(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start_time = Instant::now();

    validate_chat_message(&req.message)?;
    let mode = Mode::parse(req.mode.as_deref().unwrap_or("conversation"));

    let Some(llm) = state.llm.clone() else {
        return Err(ApiError::LlmError(
            "no language model configured: set OPENAI_API_KEY".to_string(),
        ));
    };

    let (prompt, agent_name) = {
        let registry = state.registry();
        let agent = registry.active();
        (agent.build_prompt(&req.message), agent.profile.name.clone())
    };

    info!(
        agent = %agent_name,
        mode = mode.as_str(),
        message_len = req.message.len(),
        "chat request received"
    );

    // Run the LLM in a blocking task with a timeout so a slow upstream
    // cannot pin the async runtime.
    let choice = pick_model(mode);
    let result = tokio::time::timeout(
        state.config.llm_timeout(),
        tokio::task::spawn_blocking({
            let prompt = prompt.clone();
            move || {
                let llm = llm.lock().unwrap_or_else(PoisonError::into_inner);
                llm.complete(&prompt, &choice)
                    .map_err(|e| ApiError::LlmError(format!("LLM error: {e}")))
            }
        }),
    )
    .await;

    let raw_reply = match result {
        Ok(Ok(Ok(reply))) => reply,
        Ok(Ok(Err(api_err))) => return Err(api_err),
        Ok(Err(join_err)) => {
            error!("Task join error: {join_err}");
            return Err(ApiError::InternalError(format!("Task join error: {join_err}")));
        }
        Err(_) => {
            let timeout_secs = state.config.llm_timeout().as_secs();
            error!("LLM request timed out after {} seconds", timeout_secs);
            return Err(ApiError::LlmError(format!(
                "Request timed out after {} seconds. Please try again with a shorter message.",
                timeout_secs
            )));
        }
    };

    let reply = {
        let mut registry = state.registry();
        let (agent, log) = registry.active_mut();
        let reply = agent.clean_reply(&raw_reply);
        log.record(req.message.clone(), reply.clone());
        let note = format!("User: {}\n{}: {}", req.message, agent.profile.name, reply);
        agent.add_memory(&note);
        reply
    };

    info!(
        "LLM reply in {:.2}s, length={}",
        start_time.elapsed().as_secs_f64(),
        reply.len()
    );

    Ok(Json(ChatResponse {
        agent: agent_name,
        response: reply,
        timestamp: Utc::now(),
        audio_enabled: state.tts.enabled(),
    }))
}

pub async fn switch_agent_endpoint(
    State(state): State<AppState>,
    Json(req): Json<SwitchRequest>,
) -> Result<Json<SwitchResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    validate_agent_name(&req.agent)?;

    let current = {
        let mut registry = state.registry();
        registry.switch(&req.agent, &state.config.data_dir)?
    };

    info!(agent = %current, "active agent switched");
    Ok(Json(SwitchResponse {
        message: format!("Switched to {current}"),
        current_agent: current,
    }))
}

pub async fn save_conversation_endpoint(
    State(state): State<AppState>,
) -> Result<Json<SaveResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);

    let saved = {
        let mut registry = state.registry();
        registry
            .save_active(&state.config.data_dir)
            .map_err(|e| ApiError::InternalError(format!("could not save history: {e}")))?
    };

    let message = match saved {
        Some(path) => {
            info!(path = %path.display(), "conversation history saved");
            "Conversation history saved successfully".to_string()
        }
        None => "No conversation to save".to_string(),
    };
    Ok(Json(SaveResponse { message }))
}

/// One-shot synthesis with the active agent's voice, returned as base64 WAV.
/// The realtime path over `/ws` is preferred for interactive playback.
pub async fn tts_endpoint(
    State(state): State<AppState>,
    Json(req): Json<TtsRequest>,
) -> Result<Json<TtsResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    validate_tts_text(&req.text)?;

    let voice_id = state.registry().active_voice();
    let pcm = state.tts.synthesize(&voice_id, &req.text).await?;
    let samples = tts_core::decode_pcm16le(&pcm)
        .map_err(|e| ApiError::InternalError(format!("synthesizer returned malformed audio: {e}")))?;

    let sample_rate = tts_core::SAMPLE_RATE;
    let duration_ms = (samples.len() as f32 / sample_rate as f32 * 1000.0) as u64;
    let audio_base64 = tts_core::encode_wav_base64(&samples, sample_rate)
        .map_err(|e| ApiError::InternalError(format!("WAV encoding error: {e}")))?;

    Ok(Json(TtsResponse {
        audio_base64,
        duration_ms,
        sample_rate,
    }))
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
    pub system_load: Option<f64>,
    pub tts_cache_hits: u64,
    pub tts_cache_misses: u64,
}

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Record process start for uptime reporting. Called once from `main`.
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let cpu_usage = system.global_cpu_info().cpu_usage();

    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    // System load is only exposed on Unix-like systems
    let system_load = {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/proc/loadavg")
                .ok()
                .and_then(|loadavg| {
                    loadavg
                        .split_whitespace()
                        .next()
                        .and_then(|s| s.parse::<f64>().ok())
                })
        }
        #[cfg(not(unix))]
        None
    };

    Json(MetricsResponse {
        cpu_usage_percent: cpu_usage,
        memory_used_mb: memory_used / 1024 / 1024,
        memory_total_mb: memory_total / 1024 / 1024,
        memory_usage_percent,
        request_count: state.request_count.load(Ordering::Relaxed),
        uptime_seconds: uptime,
        system_load,
        tts_cache_hits: state.tts.cache_hits(),
        tts_cache_misses: state.tts.cache_misses(),
    })
}
