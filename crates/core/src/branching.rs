//! Branching health validation for questionnaire graphs.
//!
//! Every question starts a depth-first walk along its answers' destinations.
//! Re-entering a question already on the current chain is a cycle; reaching
//! the same question along two independent chains (a "diamond") is not.
//! A question whose whole reachable subgraph has been proven healthy is
//! remembered, so shared downstream questions are only walked once.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::CoreError;
use crate::graph::{Destination, Question, QuestionnaireGraph};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default upper bound on live questions a publish will validate.
pub const DEFAULT_MAX_QUESTIONS: usize = 500;

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Outcome of branching validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthVerdict {
    Ok,
    /// Some chain of answers leads back to a question already on it.
    Cyclic,
    /// Some branch ends without a destination.
    Broken,
}

impl HealthVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Cyclic => "cyclic",
            Self::Broken => "broken",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verdict plus the question/answer that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BranchingReport {
    pub verdict: HealthVerdict,
    /// For `Cyclic`, the re-entered question; for `Broken`, the question
    /// holding the dead end.
    pub question_id: Option<DbId>,
    /// For `Broken`, the answer without a usable destination (absent when the
    /// question has no answers at all).
    pub answer_id: Option<DbId>,
}

impl BranchingReport {
    fn ok() -> Self {
        Self {
            verdict: HealthVerdict::Ok,
            question_id: None,
            answer_id: None,
        }
    }

    fn cyclic(question_id: DbId) -> Self {
        Self {
            verdict: HealthVerdict::Cyclic,
            question_id: Some(question_id),
            answer_id: None,
        }
    }

    fn broken(question_id: DbId, answer_id: Option<DbId>) -> Self {
        Self {
            verdict: HealthVerdict::Broken,
            question_id: Some(question_id),
            answer_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Dead-end policy
// ---------------------------------------------------------------------------

/// Which answers without a destination count as dead ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadEndPolicy {
    /// Only answers of the last question by ordinal. Interior answers without
    /// a destination are left to the runtime's "next question" fallback.
    #[default]
    LastQuestionOnly,
    /// Every answer without a destination, and every question without answers.
    AllQuestions,
}

impl DeadEndPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastQuestionOnly => "last_question",
            Self::AllQuestions => "all_questions",
        }
    }

    /// Parse from configuration.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "last_question" => Ok(Self::LastQuestionOnly),
            "all_questions" => Ok(Self::AllQuestions),
            other => Err(CoreError::Validation(format!(
                "Unknown dead-end policy '{other}'. Must be one of: last_question, all_questions"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a graph with the default dead-end policy.
pub fn validate(graph: &QuestionnaireGraph) -> HealthVerdict {
    diagnose(graph, DeadEndPolicy::default()).verdict
}

/// Validate a graph and report where it first failed.
///
/// Questions are tried in ordinal order and answers in authoring order, so
/// the reported location is stable for identical graphs.
pub fn diagnose(graph: &QuestionnaireGraph, policy: DeadEndPolicy) -> BranchingReport {
    let mut walker = Walker {
        graph,
        policy,
        chain: Vec::new(),
        healthy: HashSet::new(),
    };

    for question in graph.questions() {
        let report = walker.walk(question);
        if !report.verdict.is_ok() {
            return report;
        }
    }
    BranchingReport::ok()
}

/// Reject graphs larger than `max` live questions.
pub fn check_graph_size(graph: &QuestionnaireGraph, max: usize) -> Result<(), CoreError> {
    if graph.len() > max {
        return Err(CoreError::Validation(format!(
            "Questionnaire has {} questions, the maximum for publishing is {max}",
            graph.len()
        )));
    }
    Ok(())
}

struct Walker<'g> {
    graph: &'g QuestionnaireGraph,
    policy: DeadEndPolicy,
    /// Questions on the current chain, outermost first.
    chain: Vec<DbId>,
    /// Questions whose reachable subgraph is known to be healthy. Sound to
    /// share across chains: a cycle through a healthy question would lie
    /// inside its own reachable subgraph.
    healthy: HashSet<DbId>,
}

impl Walker<'_> {
    fn walk(&mut self, question: &Question) -> BranchingReport {
        if self.chain.contains(&question.id) {
            return BranchingReport::cyclic(question.id);
        }
        if self.healthy.contains(&question.id) {
            return BranchingReport::ok();
        }
        if question.answers.is_empty() && self.policy == DeadEndPolicy::AllQuestions {
            return BranchingReport::broken(question.id, None);
        }

        self.chain.push(question.id);
        let report = self.walk_answers(question);
        self.chain.pop();

        if report.verdict.is_ok() {
            self.healthy.insert(question.id);
        }
        report
    }

    fn walk_answers(&mut self, question: &Question) -> BranchingReport {
        let graph = self.graph;
        for answer in &question.answers {
            let report = match &answer.destination {
                Destination::Question { question_id } => match graph.question(*question_id) {
                    Some(next) => self.walk(next),
                    // Target deleted or belongs elsewhere.
                    None => BranchingReport::broken(question.id, Some(answer.id)),
                },
                Destination::ExternalLink { .. } | Destination::CustomContent { .. } => continue,
                Destination::None => {
                    if self.is_dead_end(question) {
                        BranchingReport::broken(question.id, Some(answer.id))
                    } else {
                        continue;
                    }
                }
            };
            if !report.verdict.is_ok() {
                return report;
            }
        }
        BranchingReport::ok()
    }

    fn is_dead_end(&self, question: &Question) -> bool {
        match self.policy {
            DeadEndPolicy::LastQuestionOnly => self.graph.is_last(question.id),
            DeadEndPolicy::AllQuestions => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
