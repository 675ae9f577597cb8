/// Session mode requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Conversation,
    Storytelling,
}

impl Mode {
    /// Unrecognized modes fall back to conversation rather than erroring.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "storytelling" => Mode::Storytelling,
            _ => Mode::Conversation,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Conversation => "conversation",
            Mode::Storytelling => "storytelling",
        }
    }
}

/// Which model to call and how much room to give the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelChoice {
    pub model: &'static str,
    pub max_tokens: u16,
}

/// Conversation stays on the fast small model with tight replies;
/// storytelling gets the larger model and room to run.
pub fn pick_model(mode: Mode) -> ModelChoice {
    match mode {
        Mode::Conversation => ModelChoice {
            model: "gpt-4o-mini",
            max_tokens: 150,
        },
        Mode::Storytelling => ModelChoice {
            model: "gpt-5-mini",
            max_tokens: 2048,
        },
    }
}
