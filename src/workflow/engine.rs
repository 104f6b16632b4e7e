//! Runs one message through the stage graph.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, error, info, warn};

use crate::error::WorkflowError;
use crate::llm::{Classifier, Responder};
use crate::mail::{MailGateway, Message, Reply};
use crate::sandbox::CodeRunner;

use super::extract::extract_code;
use super::graph::{self, Stage};
use super::types::{Category, ProcessResult, RunOutcome, StageDelta, WorkflowRun};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const NO_CODE_FOUND: &str = "No valid Python code was found in your email.";
pub const SPAM_IGNORED: &str = "Spam ignored.";
pub const SIGNATURE: &str = "This email was generated by an automated mail processing agent.";

/// Source of "now" for reply timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always the same instant.
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

pub struct Engine {
    classifier: Arc<dyn Classifier>,
    responder: Arc<dyn Responder>,
    runner: Arc<dyn CodeRunner>,
    gateway: Arc<dyn MailGateway>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        responder: Arc<dyn Responder>,
        runner: Arc<dyn CodeRunner>,
        gateway: Arc<dyn MailGateway>,
    ) -> Self {
        Self {
            classifier,
            responder,
            runner,
            gateway,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Walk the graph from `Start` to `End`.
    ///
    /// Collaborator failures are absorbed by the stages. An error here means
    /// the engine itself is inconsistent.
    pub async fn run(&self, message: &Message) -> Result<RunOutcome, WorkflowError> {
        let mut run = WorkflowRun::new(message);
        let mut stage = Stage::Start;
        let mut path = vec![stage];

        while !stage.is_terminal() {
            debug!(id = %message.id, stage = %stage, "Entering stage");
            let delta = self.execute(stage, &run).await?;
            run = run.apply(stage, delta)?;
            stage = graph::next(stage, run.category)?;
            path.push(stage);
        }

        Ok(RunOutcome {
            message_id: message.id.clone(),
            category: run.require_category(Stage::End)?,
            result: run.require_result(Stage::End)?.clone(),
            reply_sent: run.reply_sent,
            path,
        })
    }

    async fn execute(&self, stage: Stage, run: &WorkflowRun<'_>) -> Result<StageDelta, WorkflowError> {
        match stage {
            Stage::Start | Stage::End => Ok(StageDelta::none()),
            Stage::Classify => Ok(self.classify(run.message).await),
            Stage::ProcessCode => Ok(self.process_code(run.message).await),
            Stage::ProcessQuestion => Ok(self.process_question(run.message).await),
            Stage::ProcessSpam => Ok(Self::process_spam(run.message)),
            Stage::Log => Self::log(run),
            Stage::Reply => self.reply(run).await,
        }
    }

    async fn classify(&self, message: &Message) -> StageDelta {
        let excerpt = message.body_excerpt();
        let category = match self
            .classifier
            .classify(&message.subject, &message.sender, &excerpt)
            .await
        {
            Ok(label) => {
                let category = Category::from_label(&label);
                if category.as_str() != label.trim().to_ascii_lowercase() {
                    debug!(id = %message.id, label = %label, "Unrecognized label, treating as spam");
                }
                category
            }
            Err(e) => {
                error!(id = %message.id, error = %e, "Classification failed, treating as spam");
                Category::Spam
            }
        };
        info!(id = %message.id, category = %category, "Classified message");
        StageDelta::category(category)
    }

    async fn process_code(&self, message: &Message) -> StageDelta {
        let code = extract_code(&message.body);
        if code.is_empty() {
            warn!(id = %message.id, "No code found in message");
            return StageDelta::result(ProcessResult::new(NO_CODE_FOUND));
        }
        info!(id = %message.id, "Extracted code:\n{code}");

        let outcome = self.runner.run(&code).await;
        if let Some(e) = &outcome.error {
            error!(id = %message.id, error = %e, "Code execution failed");
        }

        let text = format!(
            "Your code execution result:\n\n```\n{}\n```\n\nOriginal code:\n```python\n{}\n```\n\n{}",
            outcome.render(),
            code,
            self.signature()
        );
        StageDelta::result(ProcessResult::new(text))
    }

    async fn process_question(&self, message: &Message) -> StageDelta {
        let text = match self
            .responder
            .answer(&message.subject, &message.sender, &message.body)
            .await
        {
            Ok(answer) => format!("{answer}\n\n{}", self.signature()),
            Err(e) => {
                error!(id = %message.id, error = %e, "Answering failed");
                format!("Sorry, an error occurred while processing your email: {e}")
            }
        };
        StageDelta::result(ProcessResult::new(text))
    }

    fn process_spam(message: &Message) -> StageDelta {
        info!(id = %message.id, subject = %message.subject, "Spam detected");
        StageDelta::result(ProcessResult::new(SPAM_IGNORED))
    }

    fn log(run: &WorkflowRun<'_>) -> Result<StageDelta, WorkflowError> {
        let category = run.require_category(Stage::Log)?;
        let result = run.require_result(Stage::Log)?;
        info!(
            id = %run.message.id,
            subject = %run.message.subject,
            sender = %run.message.sender,
            category = %category,
            result = %result.log_excerpt(),
            "Processing result"
        );
        Ok(StageDelta::none())
    }

    async fn reply(&self, run: &WorkflowRun<'_>) -> Result<StageDelta, WorkflowError> {
        let category = run.require_category(Stage::Reply)?;
        if !category.wants_reply() {
            return Ok(StageDelta::none());
        }
        let result = run.require_result(Stage::Reply)?;
        let reply = Reply::to_message(run.message, result.text());

        let sent = match self.gateway.send(&reply).await {
            Ok(()) => {
                info!(id = %run.message.id, to = %reply.to, "Reply sent");
                true
            }
            Err(e) => {
                error!(id = %run.message.id, to = %reply.to, error = %e, "Failed to send reply");
                false
            }
        };
        Ok(StageDelta::reply_sent(sent))
    }

    fn signature(&self) -> String {
        format!(
            "---\n{SIGNATURE}\nProcessed at: {}",
            self.clock.now().format(TIMESTAMP_FORMAT)
        )
    }
}
