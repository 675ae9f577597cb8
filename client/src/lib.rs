//! Terminal client for the twin server: chat over HTTP, speech over a
//! WebSocket audio streaming session played through the local speakers.

pub mod api;
pub mod config;
pub mod error;
pub mod output;
pub mod session;

pub use api::{ApiError, TwinApi};
pub use config::ClientConfig;
pub use error::SessionError;
pub use output::{AudioOutput, OutputError, RodioOutput};
pub use session::{Session, SessionEvent, SessionHandle};
