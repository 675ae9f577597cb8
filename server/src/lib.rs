//! HTTP and WebSocket surface for the digital twin service.
//!
//! The router serves chat against the active twin, roster management, one-shot
//! synthesis, and the realtime speech stream at `/ws`. [`routes::build_router`]
//! assembles the whole app from an [`state::AppState`] so tests can drive the
//! real handlers without binding a port.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod validation;
pub mod ws;

pub use config::ServerConfig;
pub use error::ApiError;
pub use routes::build_router;
pub use state::{AgentRegistry, AppState};
