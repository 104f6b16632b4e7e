//! Mailbox access: IMAP for inbound, SMTP via lettre for outbound.

pub mod gateway;
pub mod imap;
pub mod parse;
pub mod smtp;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MailError;

pub use gateway::ImapSmtpGateway;

/// Number of body characters the classifier gets to see.
pub const CLASSIFY_EXCERPT_CHARS: usize = 500;

/// Mailbox-assigned identity of a message (IMAP UID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// An unread message as fetched from the mailbox. Never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub subject: String,
    /// Sender address, replies go here.
    pub sender: String,
    /// Plain-text body.
    pub body: String,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        subject: impl Into<String>,
        sender: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId(id.into()),
            subject: subject.into(),
            sender: sender.into(),
            body: body.into(),
        }
    }

    /// First [`CLASSIFY_EXCERPT_CHARS`] characters of the body, `...`-suffixed when cut.
    pub fn body_excerpt(&self) -> String {
        if self.body.chars().count() <= CLASSIFY_EXCERPT_CHARS {
            self.body.clone()
        } else {
            let head: String = self.body.chars().take(CLASSIFY_EXCERPT_CHARS).collect();
            format!("{head}...")
        }
    }
}

/// An outgoing reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Reply {
    /// Reply to the sender of `message`, subject prefixed with `Re: `.
    pub fn to_message(message: &Message, body: impl Into<String>) -> Self {
        Self {
            to: message.sender.clone(),
            subject: format!("Re: {}", message.subject),
            body: body.into(),
        }
    }
}

/// Mailbox operations the workflow depends on.
///
/// One session per batch: `open` once, sequential calls, `close` once.
#[async_trait]
pub trait MailGateway: Send + Sync {
    /// Connect and authenticate.
    async fn open(&self) -> Result<(), MailError>;

    /// First `limit` unseen messages, in mailbox order. Fetching must not
    /// mark them read.
    async fn fetch_unread(&self, limit: usize) -> Result<Vec<Message>, MailError>;

    /// Flag a message as read so the next batch skips it.
    async fn mark_read(&self, id: &MessageId) -> Result<(), MailError>;

    /// Deliver a reply.
    async fn send(&self, reply: &Reply) -> Result<(), MailError>;

    /// Log out and drop the session.
    async fn close(&self) -> Result<(), MailError>;
}
