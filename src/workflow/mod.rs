//! Email triage workflow: a fixed stage graph run once per message.

pub mod batch;
pub mod engine;
pub mod extract;
pub mod graph;
pub mod types;

pub use batch::{BatchDriver, BatchReport};
pub use engine::{Clock, Engine, FixedClock, SystemClock};
pub use graph::{Stage, mermaid};
pub use types::{Category, ProcessResult, RunOutcome, StageDelta, WorkflowRun};
