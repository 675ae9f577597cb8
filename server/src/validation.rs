use crate::error::ApiError;

/// Maximum length for a chat message
const MAX_MESSAGE_LENGTH: usize = 2000;
/// Maximum text length for synthesis requests
const MAX_TEXT_LENGTH: usize = 5000;
/// Maximum length for an agent name
const MAX_AGENT_NAME_LENGTH: usize = 64;

/// Validate a chat message
pub fn validate_chat_message(message: &str) -> Result<(), ApiError> {
    if message.trim().is_empty() {
        return Err(ApiError::InvalidInput("Message cannot be empty".to_string()));
    }
    if message.len() > MAX_MESSAGE_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Message too long (max {} characters)",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(())
}

/// Validate text submitted for speech synthesis
pub fn validate_tts_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.len() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

/// Validate an agent name from a switch request
pub fn validate_agent_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::InvalidInput("Agent name cannot be empty".to_string()));
    }
    if name.len() > MAX_AGENT_NAME_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Agent name too long (max {} characters)",
            MAX_AGENT_NAME_LENGTH
        )));
    }
    Ok(())
}
