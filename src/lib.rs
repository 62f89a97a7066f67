//! Voyage Relay - AI voyage estimator chat service
//!
//! Serves a single chat page and relays each conversation to an
//! OpenAI-compatible completion API behind a fixed voyage estimation
//! system instruction. All estimation happens in the model; this crate only
//! manages the conversation and normalises upstream errors.

pub mod config;
pub mod conversation;
pub mod relay;
pub mod render;
pub mod routes;

pub use config::Config;
pub use conversation::{ChatSession, Message, Role, SubmitError};
pub use relay::{Relay, RelayError, RelayService};
pub use routes::{router, AppState};
