//! Common utilities for integration tests

use std::path::Path;

use axum::Router;

use server::config::ServerConfig;
use server::routes::build_router;
use server::state::{AgentRegistry, AppState};
use tts_core::{RealtimeTts, DEFAULT_WS_BASE};
use twin_core::{builtin_roster, LlmClient};

pub fn test_config(data_dir: &Path) -> ServerConfig {
    ServerConfig {
        data_dir: data_dir.to_path_buf(),
        ..ServerConfig::default()
    }
}

/// State with the built-in roster, no language model, and synthesis disabled.
pub fn test_state(data_dir: &Path) -> AppState {
    AppState::new(
        AgentRegistry::new(builtin_roster()),
        None,
        RealtimeTts::new(None, DEFAULT_WS_BASE),
        test_config(data_dir),
    )
}

/// Same as [`test_state`] but chatting against a stub LLM endpoint.
pub fn test_state_with_llm(data_dir: &Path, llm_base: &str) -> AppState {
    // The blocking reqwest client must be built off the tokio test runtime;
    // constructing it inside an async context panics in debug builds.
    let llm_base = llm_base.to_string();
    let llm = std::thread::spawn(move || LlmClient::new("test-key", llm_base))
        .join()
        .expect("building the stub LlmClient should not panic");
    AppState::new(
        AgentRegistry::new(builtin_roster()),
        Some(llm),
        RealtimeTts::new(None, DEFAULT_WS_BASE),
        test_config(data_dir),
    )
}

pub fn create_test_app(data_dir: &Path) -> Router {
    build_router(test_state(data_dir))
}
