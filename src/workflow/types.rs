//! Values threaded through a run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::mail::{Message, MessageId};

use super::Stage;

/// Maximum characters of a result written to the log.
pub const LOG_EXCERPT_CHARS: usize = 100;

/// What a message is, as far as the workflow cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Code,
    Question,
    Spam,
}

impl Category {
    /// Normalize a classifier label. Anything that is not exactly one of the
    /// three tags (after trimming and lowercasing) is spam, so an unclear
    /// answer can never trigger execution or a reply.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "code" => Self::Code,
            "question" => Self::Question,
            _ => Self::Spam,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Question => "question",
            Self::Spam => "spam",
        }
    }

    /// Whether the sender gets a reply.
    pub fn wants_reply(self) -> bool {
        !matches!(self, Self::Spam)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the processing stage: the full reply text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    text: String,
}

impl ProcessResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// At most [`LOG_EXCERPT_CHARS`] characters, `...`-suffixed when cut.
    pub fn log_excerpt(&self) -> String {
        truncate_for_log(&self.text)
    }
}

/// Truncate text for a log line (UTF-8 safe).
pub fn truncate_for_log(text: &str) -> String {
    if text.chars().count() <= LOG_EXCERPT_CHARS {
        text.to_string()
    } else {
        let head: String = text.chars().take(LOG_EXCERPT_CHARS).collect();
        format!("{head}...")
    }
}

/// What a stage produced. Stages never touch the run directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageDelta {
    pub category: Option<Category>,
    pub result: Option<ProcessResult>,
    pub reply_sent: Option<bool>,
}

impl StageDelta {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn category(category: Category) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    pub fn result(result: ProcessResult) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }

    pub fn reply_sent(sent: bool) -> Self {
        Self {
            reply_sent: Some(sent),
            ..Self::default()
        }
    }
}

/// State of one run. Borrows the message, so the engine cannot alter it.
#[derive(Debug, Clone)]
pub struct WorkflowRun<'a> {
    pub message: &'a Message,
    pub category: Option<Category>,
    pub result: Option<ProcessResult>,
    pub reply_sent: Option<bool>,
}

impl<'a> WorkflowRun<'a> {
    pub fn new(message: &'a Message) -> Self {
        Self {
            message,
            category: None,
            result: None,
            reply_sent: None,
        }
    }

    /// Fold a stage's delta into a new run value. Each field is write-once.
    pub fn apply(self, stage: Stage, delta: StageDelta) -> Result<Self, WorkflowError> {
        Ok(Self {
            message: self.message,
            category: set_once(stage, "category", self.category, delta.category)?,
            result: set_once(stage, "result", self.result, delta.result)?,
            reply_sent: set_once(stage, "reply_sent", self.reply_sent, delta.reply_sent)?,
        })
    }

    pub fn require_category(&self, stage: Stage) -> Result<Category, WorkflowError> {
        self.category.ok_or(WorkflowError::MissingCategory { stage })
    }

    pub fn require_result(&self, stage: Stage) -> Result<&ProcessResult, WorkflowError> {
        self.result.as_ref().ok_or(WorkflowError::MissingResult { stage })
    }
}

fn set_once<T>(stage: Stage, field: &'static str, current: Option<T>, update: Option<T>) -> Result<Option<T>, WorkflowError> {
    match (current, update) {
        (Some(_), Some(_)) => Err(WorkflowError::FieldAlreadySet { stage, field }),
        (current, None) => Ok(current),
        (None, update) => Ok(update),
    }
}

/// What a completed run hands back to the batch driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub message_id: MessageId,
    pub category: Category,
    pub result: ProcessResult,
    /// `None` when no reply was due (spam).
    pub reply_sent: Option<bool>,
    /// Stages visited, in order, from `Start` to `End`.
    pub path: Vec<Stage>,
}
