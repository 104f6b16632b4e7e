//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::sandbox::SandboxPolicy;

/// Default number of messages handled per batch.
pub const DEFAULT_MAX_MESSAGES: usize = 3;

/// Default pause between two runs, to stay under LLM and SMTP rate limits.
pub const DEFAULT_MESSAGE_DELAY: Duration = Duration::from_secs(2);

/// Example environment printed when startup is blocked by missing settings.
pub const EXAMPLE_ENV: &str = "\
EMAIL_IMAP_HOST=imap.example.com
EMAIL_USERNAME=you@example.com
EMAIL_PASSWORD=app-password
LLM_API_KEY=sk-...
# optional
LLM_BACKEND=openai
MAIL_AGENT_LOG_DIR=logs
MAIL_AGENT_MAX_EMAILS=3";

/// Mailbox account and server endpoints.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

/// Batch driver settings.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum unread messages pulled per batch.
    pub max_messages: usize,
    /// Pause inserted between two runs.
    pub message_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            message_delay: DEFAULT_MESSAGE_DELAY,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mail: MailConfig,
    pub llm: LlmConfig,
    pub batch: BatchConfig,
    pub sandbox: SandboxPolicy,
    /// Directory receiving the log file and the workflow diagram.
    pub log_dir: PathBuf,
}

impl AppConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, Vec<ConfigError>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// Every problem is collected so the operator sees all of them at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Vec<ConfigError>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut errors = Vec::new();

        let mut required = |key: &str, hint: &str| {
            get(key).unwrap_or_else(|| {
                errors.push(ConfigError::MissingRequired {
                    key: key.to_string(),
                    hint: hint.to_string(),
                });
                String::new()
            })
        };

        let imap_host = required("EMAIL_IMAP_HOST", "Set it to your IMAP server, e.g. imap.example.com");
        let username = required("EMAIL_USERNAME", "The mailbox account to triage");
        let password = required("EMAIL_PASSWORD", "The mailbox password or app token");
        let api_key = required("LLM_API_KEY", "An API key for the configured LLM backend");

        let imap_port = parse_or(&get, "EMAIL_IMAP_PORT", 993_u16, &mut errors);
        let smtp_port = parse_or(&get, "EMAIL_SMTP_PORT", 465_u16, &mut errors);
        let max_messages = parse_or(&get, "MAIL_AGENT_MAX_EMAILS", DEFAULT_MAX_MESSAGES, &mut errors);
        let delay_secs = parse_or(&get, "MAIL_AGENT_DELAY_SECS", DEFAULT_MESSAGE_DELAY.as_secs(), &mut errors);

        if max_messages == 0 {
            errors.push(ConfigError::InvalidValue {
                key: "MAIL_AGENT_MAX_EMAILS".into(),
                message: "must be at least 1".into(),
            });
        }

        let backend = match get("LLM_BACKEND").as_deref() {
            None => LlmBackend::OpenAi,
            Some(raw) => LlmBackend::parse(raw).unwrap_or_else(|| {
                errors.push(ConfigError::InvalidValue {
                    key: "LLM_BACKEND".into(),
                    message: format!("unknown backend '{raw}', expected 'openai' or 'anthropic'"),
                });
                LlmBackend::OpenAi
            }),
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        let smtp_host = get("EMAIL_SMTP_HOST").unwrap_or_else(|| imap_host.replace("imap", "smtp"));
        let from_address = get("EMAIL_FROM_ADDRESS").unwrap_or_else(|| username.clone());
        let model = get("LLM_MODEL").unwrap_or_else(|| backend.default_model().to_string());

        let mut sandbox = SandboxPolicy::default();
        if let Some(interpreter) = get("MAIL_AGENT_INTERPRETER") {
            sandbox.interpreter = interpreter;
        }

        Ok(Self {
            mail: MailConfig {
                imap_host,
                imap_port,
                smtp_host,
                smtp_port,
                username,
                password: SecretString::from(password),
                from_address,
            },
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
            },
            batch: BatchConfig {
                max_messages,
                message_delay: Duration::from_secs(delay_secs),
            },
            sandbox,
            log_dir: get("MAIL_AGENT_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T, errors: &mut Vec<ConfigError>) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            errors.push(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            });
            default
        }),
    }
}
