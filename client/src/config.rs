use std::env;
use std::time::Duration;

/// Client connection settings, read once at startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub open_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8085".to_string(),
            open_timeout_secs: 5,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_url: env::var("TWIN_SERVER_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.server_url),
            open_timeout_secs: env::var("WS_OPEN_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.open_timeout_secs),
        }
    }

    /// The streaming endpoint, derived from the HTTP base URL.
    pub fn ws_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws_base}/ws")
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }
}
