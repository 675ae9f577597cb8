use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery instructions baked into every prompt. These shape phrasing and
/// rhythm, not content.
const STYLE_GUIDANCE: &str = "Speak naturally and conversationally. Keep responses concise and \
    flowing. Use fragments, statements, and natural pauses. Avoid ending every response with \
    questions. When you do ask questions, make them feel organic to the conversation. Don't \
    fixate on single topics - let conversations evolve naturally. Respond like you would in a \
    casual chat with a friend.";

/// Static identity of a digital twin: who it is and which synthesizer voice
/// it speaks with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub personality: String,
    pub voice_id: String,
}

/// One episodic memory. Summaries are produced by roll-up and rank like any
/// other memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_summary: bool,
}

/// A digital twin: profile, episodic memories, and the relation graph parsed
/// out of them.
#[derive(Debug, Clone)]
pub struct Agent {
    pub profile: AgentProfile,
    memories: Vec<Memory>,
    graph: HashMap<String, HashSet<String>>,
}

impl Agent {
    pub fn new(profile: AgentProfile) -> Self {
        Self {
            profile,
            memories: Vec::new(),
            graph: HashMap::new(),
        }
    }

    pub fn seeded(profile: AgentProfile, seeds: &[&str]) -> Self {
        let mut agent = Self::new(profile);
        for text in seeds {
            agent.add_memory(text);
        }
        agent
    }

    pub fn memory_count(&self) -> usize {
        self.memories.len()
    }

    /// Store a memory and fold any relation it states into the graph.
    pub fn add_memory(&mut self, text: &str) {
        self.memories.push(Memory {
            text: text.to_string(),
            timestamp: Utc::now(),
            is_summary: false,
        });
        self.update_graph(text);
    }

    /// Parse `A -> B` and `A is B` statements into directed edges. Nodes are
    /// lowercased so lookups from query tokens can hit them.
    fn update_graph(&mut self, text: &str) {
        let edge = text
            .split_once("->")
            .or_else(|| text.split_once(" is "));
        if let Some((a, b)) = edge {
            let a = a.trim().to_lowercase();
            let b = b.trim().to_lowercase();
            if !a.is_empty() && !b.is_empty() {
                self.graph.entry(a).or_default().insert(b);
            }
        }
    }

    /// Nodes reachable from the query's tokens within `depth` hops, sorted
    /// for stable prompts.
    pub fn graph_context(&self, query: &str, depth: usize) -> Vec<String> {
        let mut found: HashSet<String> = HashSet::new();
        let tokens: HashSet<String> = query.split_whitespace().map(str::to_lowercase).collect();
        for seed in tokens.iter().filter(|t| self.graph.contains_key(*t)) {
            let mut to_visit: HashSet<&str> = HashSet::from([seed.as_str()]);
            for _ in 0..depth {
                let mut next_visit: HashSet<&str> = HashSet::new();
                for node in &to_visit {
                    for neighbour in self.graph.get(*node).into_iter().flatten() {
                        if !found.contains(neighbour.as_str()) {
                            found.insert(neighbour.clone());
                            next_visit.insert(neighbour.as_str());
                        }
                    }
                }
                to_visit = next_visit;
            }
        }
        let mut context: Vec<String> = found.into_iter().collect();
        context.sort();
        context
    }

    /// The memories most relevant to `query`, ranked by keyword overlap and
    /// then recency. Memories sharing no keyword with the query are left out.
    pub fn retrieve_memories(&self, query: &str, top_k: usize) -> Vec<String> {
        let query_tokens = keywords(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, &Memory)> = self
            .memories
            .iter()
            .filter_map(|m| {
                let score = keywords(&m.text).intersection(&query_tokens).count();
                (score > 0).then_some((score, m))
            })
            .collect();
        scored.sort_by(|(sa, ma), (sb, mb)| {
            sb.cmp(sa).then_with(|| mb.timestamp.cmp(&ma.timestamp))
        });
        scored
            .into_iter()
            .take(top_k)
            .map(|(_, m)| m.text.clone())
            .collect()
    }

    /// Assemble the chat prompt: identity, style guidance, relevant memories,
    /// graph context, then the user turn with the agent named as speaker.
    pub fn build_prompt(&self, user_msg: &str) -> String {
        let relevant = self.retrieve_memories(user_msg, 5).join("\n");
        let graph_info = self.graph_context(user_msg, 1).join(", ");
        format!(
            "You are {name}. Personality: {personality}\n{STYLE_GUIDANCE}\n\
             Relevant memories:\n{relevant}\n\
             Graph context: {graph_info}\n\n\
             User: {user_msg}\n{name}:",
            name = self.profile.name,
            personality = self.profile.personality,
        )
    }

    /// Models often echo the speaker tag the prompt ends with. Strip it.
    pub fn clean_reply(&self, raw: &str) -> String {
        let reply = raw.trim();
        let prefix = format!("{}:", self.profile.name);
        match reply.get(..prefix.len()) {
            Some(head) if head.eq_ignore_ascii_case(&prefix) => {
                reply[prefix.len()..].trim_start().to_string()
            }
            _ => reply.to_string(),
        }
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// The twins shipped with the server. Lars keeps his dedicated synthesizer
/// voice; the others use stock voices.
pub fn builtin_roster() -> Vec<Agent> {
    vec![
        Agent::seeded(
            AgentProfile {
                name: "Lars".into(),
                personality: "Immersive experiences student who loves classic music.".into(),
                voice_id: "5epn2vbuws8S5MRzxJH8".into(),
            },
            &[
                "I'm from Germany and Virginia and study immersive experiences at SCAD.",
                "My girlfriend is Anushhka and we have a dragon pet named Sara.",
                "I love music from the '60s and '70s.",
            ],
        ),
        Agent::seeded(
            AgentProfile {
                name: "Anushhka".into(),
                personality: "Creative soul from India who practices Transcendental Meditation."
                    .into(),
                voice_id: "EXAVITQu4vr4xnSDxMaL".into(),
            },
            &[
                "I'm from India and study at SCAD.",
                "My boyfriend is Lars and we share a dragon pet named Sara.",
                "I practice Transcendental Meditation and love Radiohead and Led Zeppelin.",
            ],
        ),
        Agent::seeded(
            AgentProfile {
                name: "Mateo".into(),
                personality: "Musician and researcher from Quito fascinated by HCI and Buddhism."
                    .into(),
                voice_id: "TxGEqnHWrfWFTfGW9XjX".into(),
            },
            &[
                "I'm from Quito, Ecuador and study HCI and Computer Music at Stanford.",
                "My girlfriend is Marielisa and my dog Florencia is a Labradane.",
                "I'm interested in Buddhism and my favorite band is Radiohead.",
            ],
        ),
    ]
}
