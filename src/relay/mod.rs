//! Relay to the external completion API

mod openai_compat;

use async_trait::async_trait;
use thiserror::Error;

use crate::conversation::Message;

pub use openai_compat::RelayService;

/// Errors surfaced to callers of the relay.
///
/// Display strings are user-facing. Internal failures deliberately carry no
/// detail in their message; the detail is logged where it happens.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("OpenAI API key not configured. Please add your API key to .env")]
    NotConfigured,

    #[error("Invalid OpenAI API key. Please check your API key.")]
    Unauthorized,

    #[error("Rate limit exceeded. Please try again in a moment.")]
    RateLimited,

    #[error("Invalid request to OpenAI API.")]
    BadRequest,

    #[error("OpenAI API error: {0}")]
    Upstream(String),

    #[error("Failed to get response from OpenAI")]
    Failed { status: u16 },

    #[error("No response from OpenAI")]
    NoResponse,

    #[error("Internal server error")]
    Transport(#[from] reqwest::Error),

    #[error("Internal server error")]
    InvalidResponse(String),
}

impl RelayError {
    /// Map an unsuccessful upstream status (and its error detail, if the body
    /// had one) to the relay taxonomy
    pub fn from_status(status: u16, detail: Option<String>) -> Self {
        match status {
            401 => Self::Unauthorized,
            429 => Self::RateLimited,
            400 => Self::BadRequest,
            _ => match detail {
                Some(detail) => Self::Upstream(detail),
                None => Self::Failed { status },
            },
        }
    }

    /// HTTP status returned to the browser
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::RateLimited => 429,
            Self::BadRequest => 400,
            _ => 500,
        }
    }
}

/// Something that can turn a conversation into the next assistant message
#[async_trait]
pub trait Relay: Send + Sync {
    /// `history` is the visible conversation, oldest first, ending with the
    /// new user message. It never includes the system instruction.
    async fn complete(&self, history: &[Message]) -> Result<Message, RelayError>;
}
