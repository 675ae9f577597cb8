use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use tts_core::RealtimeTts;
use twin_core::{Agent, ConversationLog, HistoryError, LlmClient};

use crate::config::ServerConfig;

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("unknown agent: {0}")]
    Unknown(String),

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// The roster of digital twins plus which one currently fronts the
/// conversation. Each twin keeps its own transcript so switching away and
/// back does not mix sessions.
pub struct AgentRegistry {
    agents: Vec<Agent>,
    logs: Vec<ConversationLog>,
    active: usize,
}

impl AgentRegistry {
    /// Build a registry from a non-empty roster. The first agent starts
    /// active.
    pub fn new(agents: Vec<Agent>) -> Self {
        debug_assert!(!agents.is_empty(), "roster must have at least one agent");
        let logs = agents.iter().map(|_| ConversationLog::new()).collect();
        Self {
            agents,
            logs,
            active: 0,
        }
    }

    pub fn active(&self) -> &Agent {
        &self.agents[self.active]
    }

    pub fn active_name(&self) -> &str {
        &self.agents[self.active].profile.name
    }

    pub fn active_voice(&self) -> String {
        self.agents[self.active].profile.voice_id.clone()
    }

    /// The active agent together with its transcript, for recording a turn.
    pub fn active_mut(&mut self) -> (&mut Agent, &mut ConversationLog) {
        (&mut self.agents[self.active], &mut self.logs[self.active])
    }

    /// Profile names in roster order.
    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.profile.name.clone()).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.agents
            .iter()
            .position(|a| a.profile.name.eq_ignore_ascii_case(name))
    }

    /// Persist the active transcript, then hand the conversation to `name`
    /// (matched case-insensitively). Nothing changes when the name is unknown
    /// or the save fails. Returns the canonical name of the new active agent.
    pub fn switch(&mut self, name: &str, data_dir: &Path) -> Result<String, SwitchError> {
        let target = self
            .position(name)
            .ok_or_else(|| SwitchError::Unknown(name.to_string()))?;
        self.save_active(data_dir)?;
        self.active = target;
        Ok(self.active_name().to_string())
    }

    /// Flush the active transcript to disk. `None` when nothing was recorded
    /// since the last save.
    pub fn save_active(&mut self, data_dir: &Path) -> Result<Option<PathBuf>, HistoryError> {
        let name = self.agents[self.active].profile.name.clone();
        self.logs[self.active].save(data_dir, &name)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Mutex<AgentRegistry>>,
    pub llm: Option<Arc<Mutex<LlmClient>>>,
    pub tts: Arc<RealtimeTts>,
    pub request_count: Arc<AtomicU64>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(
        registry: AgentRegistry,
        llm: Option<LlmClient>,
        tts: RealtimeTts,
        config: ServerConfig,
    ) -> Self {
        Self {
            registry: Arc::new(Mutex::new(registry)),
            llm: llm.map(|client| Arc::new(Mutex::new(client))),
            tts: Arc::new(tts),
            request_count: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    /// Lock the registry. Handlers hold the guard only for short critical
    /// sections and never across an await.
    pub fn registry(&self) -> MutexGuard<'_, AgentRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
