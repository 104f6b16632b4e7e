//! The fixed stage graph.
//!
//! Transitions live in one static table. A guarded edge is only taken when
//! the run's category matches; the first matching edge wins.

use std::fmt;

use crate::error::WorkflowError;

use super::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Start,
    Classify,
    ProcessCode,
    ProcessQuestion,
    ProcessSpam,
    Log,
    Reply,
    End,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Classify => "classify",
            Self::ProcessCode => "process_code",
            Self::ProcessQuestion => "process_question",
            Self::ProcessSpam => "process_spam",
            Self::Log => "log",
            Self::Reply => "reply",
            Self::End => "end",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::End)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge of the graph.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub from: Stage,
    pub to: Stage,
    /// Only taken when the run was classified as this category.
    pub guard: Option<Category>,
}

const fn edge(from: Stage, to: Stage) -> Transition {
    Transition { from, to, guard: None }
}

const fn guarded(from: Stage, to: Stage, category: Category) -> Transition {
    Transition {
        from,
        to,
        guard: Some(category),
    }
}

pub const TRANSITIONS: &[Transition] = &[
    edge(Stage::Start, Stage::Classify),
    guarded(Stage::Classify, Stage::ProcessCode, Category::Code),
    guarded(Stage::Classify, Stage::ProcessQuestion, Category::Question),
    guarded(Stage::Classify, Stage::ProcessSpam, Category::Spam),
    edge(Stage::ProcessCode, Stage::Log),
    edge(Stage::ProcessQuestion, Stage::Log),
    edge(Stage::ProcessSpam, Stage::Log),
    edge(Stage::Log, Stage::Reply),
    edge(Stage::Reply, Stage::End),
];

/// Resolve the stage after `from`.
///
/// Guarded edges need a category; reaching one without it is an engine fault,
/// as is a stage with no matching edge.
pub fn next(from: Stage, category: Option<Category>) -> Result<Stage, WorkflowError> {
    let mut saw_guard = false;
    for transition in TRANSITIONS.iter().filter(|t| t.from == from) {
        match transition.guard {
            None => return Ok(transition.to),
            Some(required) => {
                saw_guard = true;
                if category == Some(required) {
                    return Ok(transition.to);
                }
            }
        }
    }
    if saw_guard && category.is_none() {
        return Err(WorkflowError::MissingCategory { stage: from });
    }
    Err(WorkflowError::NoTransition { stage: from })
}

/// Render the graph as a Mermaid `graph TD` document.
pub fn mermaid() -> String {
    let mut out = String::from("graph TD\n");
    for t in TRANSITIONS {
        match t.guard {
            Some(category) => {
                out.push_str(&format!("    {} -->|{}| {}\n", t.from, category, t.to));
            }
            None => out.push_str(&format!("    {} --> {}\n", t.from, t.to)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_edges() {
        assert_eq!(next(Stage::Start, None).unwrap(), Stage::Classify);
        assert_eq!(next(Stage::ProcessSpam, Some(Category::Spam)).unwrap(), Stage::Log);
        assert_eq!(next(Stage::Log, Some(Category::Code)).unwrap(), Stage::Reply);
        assert_eq!(next(Stage::Reply, Some(Category::Code)).unwrap(), Stage::End);
    }

    #[test]
    fn classify_routes_by_category() {
        assert_eq!(next(Stage::Classify, Some(Category::Code)).unwrap(), Stage::ProcessCode);
        assert_eq!(
            next(Stage::Classify, Some(Category::Question)).unwrap(),
            Stage::ProcessQuestion
        );
        assert_eq!(next(Stage::Classify, Some(Category::Spam)).unwrap(), Stage::ProcessSpam);
    }

    #[test]
    fn classify_without_category_is_a_fault() {
        let err = next(Stage::Classify, None).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingCategory { stage: Stage::Classify }));
    }

    #[test]
    fn end_has_no_outgoing_edge() {
        let err = next(Stage::End, Some(Category::Code)).unwrap_err();
        assert!(matches!(err, WorkflowError::NoTransition { stage: Stage::End }));
    }

    #[test]
    fn every_stage_but_end_has_an_exit() {
        for stage in [
            Stage::Start,
            Stage::Classify,
            Stage::ProcessCode,
            Stage::ProcessQuestion,
            Stage::ProcessSpam,
            Stage::Log,
            Stage::Reply,
        ] {
            assert!(TRANSITIONS.iter().any(|t| t.from == stage), "{stage} has no exit");
        }
    }

    #[test]
    fn mermaid_lists_every_edge() {
        let doc = mermaid();
        assert!(doc.starts_with("graph TD\n"));
        assert_eq!(doc.lines().count(), TRANSITIONS.len() + 1);
        assert!(doc.contains("classify -->|question| process_question"));
        assert!(doc.contains("log --> reply"));
    }
}
