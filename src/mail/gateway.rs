//! IMAP + SMTP implementation of [`MailGateway`].

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::MailConfig;
use crate::error::MailError;

use super::imap::ImapSession;
use super::{MailGateway, Message, MessageId, Reply, parse, smtp};

/// Gateway holding one IMAP session for the lifetime of a batch.
///
/// All IMAP and SMTP I/O is blocking and runs on the blocking pool. The
/// mutex only serializes access; the batch never issues calls concurrently.
pub struct ImapSmtpGateway {
    config: MailConfig,
    session: Arc<Mutex<Option<ImapSession>>>,
}

impl ImapSmtpGateway {
    pub fn new(config: MailConfig) -> Self {
        Self {
            config,
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Run `f` against the open session on the blocking pool.
    async fn with_session<T, F>(&self, f: F) -> Result<T, MailError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession) -> Result<T, MailError> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|_| MailError::Protocol("IMAP session lock poisoned".into()))?;
            let session = guard.as_mut().ok_or(MailError::NotConnected)?;
            f(session)
        })
        .await
        .map_err(|e| MailError::Protocol(format!("IMAP task failed: {e}")))?
    }
}

#[async_trait]
impl MailGateway for ImapSmtpGateway {
    async fn open(&self) -> Result<(), MailError> {
        let config = self.config.clone();
        let session = Arc::clone(&self.session);

        tokio::task::spawn_blocking(move || {
            let opened = ImapSession::connect(&config)?;
            let mut guard = session
                .lock()
                .map_err(|_| MailError::Protocol("IMAP session lock poisoned".into()))?;
            *guard = Some(opened);
            Ok::<_, MailError>(())
        })
        .await
        .map_err(|e| MailError::Protocol(format!("IMAP task failed: {e}")))??;

        info!(host = %self.config.imap_host, user = %self.config.username, "Connected to mailbox");
        Ok(())
    }

    async fn fetch_unread(&self, limit: usize) -> Result<Vec<Message>, MailError> {
        self.with_session(move |session| {
            let uids = session.search_unseen()?;
            info!("Found {} unread message(s)", uids.len());
            if uids.len() > limit {
                info!("Limiting batch to {limit}/{}", uids.len());
            }

            let mut messages = Vec::new();
            for uid in uids.iter().take(limit) {
                let raw = match session.fetch_raw(uid) {
                    Ok(raw) => raw,
                    Err(e) => {
                        error!(uid = %uid, error = %e, "Failed to fetch message");
                        continue;
                    }
                };
                match parse::parse_message(uid, &raw) {
                    Some(message) => {
                        info!(uid = %uid, subject = %message.subject, "Fetched message");
                        messages.push(message);
                    }
                    None => {
                        let err = MailError::Parse { id: uid.clone() };
                        error!(uid = %uid, error = %err, "Skipping message");
                    }
                }
            }
            Ok(messages)
        })
        .await
    }

    async fn mark_read(&self, id: &MessageId) -> Result<(), MailError> {
        let uid = id.0.clone();
        self.with_session(move |session| session.mark_seen(&uid)).await
    }

    async fn send(&self, reply: &Reply) -> Result<(), MailError> {
        let config = self.config.clone();
        let reply = reply.clone();

        tokio::task::spawn_blocking(move || smtp::send_reply(&config, &reply))
            .await
            .map_err(|e| MailError::Protocol(format!("SMTP task failed: {e}")))?
    }

    async fn close(&self) -> Result<(), MailError> {
        let session = Arc::clone(&self.session);

        let result = tokio::task::spawn_blocking(move || {
            let taken = session
                .lock()
                .map_err(|_| MailError::Protocol("IMAP session lock poisoned".into()))?
                .take();
            match taken {
                Some(session) => session.logout(),
                None => {
                    warn!("Close requested without an open mailbox session");
                    Ok(())
                }
            }
        })
        .await
        .map_err(|e| MailError::Protocol(format!("IMAP task failed: {e}")))?;

        if result.is_ok() {
            info!("Mailbox connection closed");
        }
        result
    }
}
