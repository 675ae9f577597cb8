//! Digital twin domain: agent profiles with episodic memory and a relation
//! graph, prompt assembly, mode-based model routing, the blocking chat
//! client, and conversation history persistence.

pub mod agent;
pub mod history;
pub mod llm;
pub mod router;

pub use agent::{builtin_roster, Agent, AgentProfile, Memory};
pub use history::{ConversationEntry, ConversationLog, HistoryError};
pub use llm::{LlmClient, LlmError};
pub use router::{pick_model, Mode, ModelChoice};
