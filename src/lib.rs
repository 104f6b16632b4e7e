//! Mail triage: classify unread mail, run embedded code, answer questions.

pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod mail;
pub mod sandbox;
pub mod workflow;
