//! Error types for the mail triage agent, one enum per concern.

use crate::workflow::Stage;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox and delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IMAP login failed for {0}")]
    AuthFailed(String),

    #[error("IMAP command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("Mailbox session is not open")]
    NotConnected,

    #[error("Failed to parse message {id}")]
    Parse { id: String },

    #[error("Failed to send mail to {to}: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned an empty response")]
    EmptyResponse { provider: String },
}

/// Engine-internal faults. Collaborator failures never surface here; they are
/// absorbed by the stage that made the call.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Stage {stage} reached without a category")]
    MissingCategory { stage: Stage },

    #[error("Stage {stage} reached without a process result")]
    MissingResult { stage: Stage },

    #[error("Stage {stage} tried to set `{field}` twice")]
    FieldAlreadySet { stage: Stage, field: &'static str },

    #[error("No transition out of stage {stage}")]
    NoTransition { stage: Stage },

    #[error("Run panicked: {0}")]
    Panicked(String),
}
