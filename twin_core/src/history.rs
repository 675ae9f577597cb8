use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("could not write history: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode history: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub user: String,
    pub agent: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Session {
    timestamp: DateTime<Utc>,
    conversations: Vec<ConversationEntry>,
}

/// Transcript of the current session with one agent. Entries accumulate in
/// memory and flush to disk as a timestamped session on save.
#[derive(Debug, Default, Clone)]
pub struct ConversationLog {
    entries: Vec<ConversationEntry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, user: impl Into<String>, agent: impl Into<String>) {
        self.entries.push(ConversationEntry {
            user: user.into(),
            agent: agent.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append the pending entries to
    /// `<data_dir>/<agent_name>/conversation_history.json` as one session and
    /// clear them. Returns the file written, or `None` when there was nothing
    /// to save. A history file that no longer parses is replaced rather than
    /// blocking the save.
    pub fn save(
        &mut self,
        data_dir: &Path,
        agent_name: &str,
    ) -> Result<Option<PathBuf>, HistoryError> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let dir = data_dir.join(agent_name);
        fs::create_dir_all(&dir)?;
        let file = dir.join("conversation_history.json");

        let mut sessions: Vec<Session> = match fs::read_to_string(&file) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %file.display(), error = %e, "unreadable history file, starting fresh");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        sessions.push(Session {
            timestamp: Utc::now(),
            conversations: std::mem::take(&mut self.entries),
        });
        fs::write(&file, serde_json::to_string_pretty(&sessions)?)?;
        Ok(Some(file))
    }
}
