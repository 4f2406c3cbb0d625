pub mod auditor;
pub mod context;
pub mod llm;
pub mod policy;
pub mod redaction;

use thiserror::Error;

/// Failures talking to an upstream model provider.
#[derive(Debug, Error)]
pub enum ShieldError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

pub use auditor::{AuditResult, Auditor};
pub use llm::{LlmReply, LlmRouter};
pub use redaction::{RedactionMode, Redactor};
