use crate::types::ProviderKind;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("no client available for provider {provider}")]
    UnsupportedProvider { provider: ProviderKind },
    #[error("invalid agent request: {message}")]
    InvalidRequest { message: String },
    #[error("conversation history is malformed: {message}")]
    InvalidConversationHistory { message: String },
    #[error("agent turn cancelled")]
    Cancelled,
    #[error("agent turn failed: {message}")]
    Runtime { message: String },
}
