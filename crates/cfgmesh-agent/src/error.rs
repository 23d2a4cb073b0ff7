//! Agent error types.
//!
//! Grounded on `clawnode::error::NodeError`'s shape (one enum, variants
//! for each subsystem, `thiserror`-derived).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("config error: {0}")]
    Config(String),

    #[error("registration failed: {0}")]
    Registration(String),

    #[error("poll failed: {0}")]
    Poll(String),

    #[error("forward to worker failed: {0}")]
    Forward(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;
