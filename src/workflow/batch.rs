//! One pass over the unread mailbox.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::config::BatchConfig;
use crate::error::{MailError, WorkflowError};
use crate::mail::{MailGateway, MessageId};

use super::Engine;

/// What happened to each fetched message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub fetched: usize,
    /// Runs that reached `End`; these were marked read.
    pub completed: Vec<MessageId>,
    /// Runs that faulted; left unread for the next batch.
    pub failed: Vec<MessageId>,
}

pub struct BatchDriver {
    engine: Engine,
    gateway: Arc<dyn MailGateway>,
    config: BatchConfig,
}

impl BatchDriver {
    pub fn new(engine: Engine, gateway: Arc<dyn MailGateway>, config: BatchConfig) -> Self {
        Self {
            engine,
            gateway,
            config,
        }
    }

    /// Open, fetch, run every message in order, close.
    ///
    /// Only a failure to open the mailbox or list its messages is returned;
    /// per-message faults are logged and recorded in the report.
    pub async fn run(&self) -> Result<BatchReport, MailError> {
        if let Err(e) = self.gateway.open().await {
            error!(error = %e, "Cannot connect to mailbox");
            return Err(e);
        }

        let messages = match self.gateway.fetch_unread(self.config.max_messages).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, "Cannot fetch unread messages");
                self.close().await;
                return Err(e);
            }
        };

        let mut report = BatchReport {
            fetched: messages.len(),
            ..BatchReport::default()
        };

        for (index, message) in messages.iter().enumerate() {
            if index > 0 && !self.config.message_delay.is_zero() {
                tokio::time::sleep(self.config.message_delay).await;
            }
            info!(id = %message.id, subject = %message.subject, "Processing message");

            let result = match AssertUnwindSafe(self.engine.run(message)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(WorkflowError::Panicked(panic_message(payload.as_ref()))),
            };

            match result {
                Ok(outcome) => {
                    if let Err(e) = self.gateway.mark_read(&message.id).await {
                        error!(id = %message.id, error = %e, "Failed to mark message read");
                    }
                    info!(
                        id = %message.id,
                        category = %outcome.category,
                        reply_sent = ?outcome.reply_sent,
                        "Message processed"
                    );
                    report.completed.push(message.id.clone());
                }
                Err(e) => {
                    error!(id = %message.id, error = %e, "Message run failed, leaving it unread");
                    report.failed.push(message.id.clone());
                }
            }
        }

        self.close().await;
        info!(
            fetched = report.fetched,
            completed = report.completed.len(),
            failed = report.failed.len(),
            "Batch finished"
        );
        Ok(report)
    }

    async fn close(&self) {
        if let Err(e) = self.gateway.close().await {
            warn!(error = %e, "Failed to close mailbox");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
