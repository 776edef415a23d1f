//! Read-only question/answer graph of a single questionnaire.
//!
//! A [`QuestionnaireGraph`] is materialized fresh from the live (non-deleted)
//! authoring rows every time validation or snapshotting runs. It has no
//! mutation methods.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Destination
// ---------------------------------------------------------------------------

/// What selecting an answer leads to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    /// No destination defined.
    None,
    /// Continue with another question of the same questionnaire.
    Question { question_id: DbId },
    /// Leave the questionnaire for an external URL.
    ExternalLink { url: String },
    /// Show a static content block.
    CustomContent { content_id: DbId },
}

impl Destination {
    /// String representation for logging and database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Question { .. } => "question",
            Self::ExternalLink { .. } => "external_link",
            Self::CustomContent { .. } => "custom_content",
        }
    }

    /// `true` when the branch ends here successfully (link or content).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ExternalLink { .. } | Self::CustomContent { .. })
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// An answer owned by a question.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub id: DbId,
    pub question_id: DbId,
    pub content: String,
    pub destination: Destination,
    /// Runtime tie-breaker among several satisfied answers.
    pub priority: Option<i32>,
}

/// A live question with its answers in authoring order.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: DbId,
    /// 1-based position within the questionnaire.
    pub order: i32,
    pub content: String,
    pub answers: Vec<Answer>,
}

/// Questionnaire-level fields carried into snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionnaireInfo {
    pub id: DbId,
    pub title: String,
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// The live questions and answers of one questionnaire at a point in time.
#[derive(Debug, Clone)]
pub struct QuestionnaireGraph {
    questionnaire: QuestionnaireInfo,
    /// Sorted by `order`.
    questions: Vec<Question>,
    index: HashMap<DbId, usize>,
}

impl QuestionnaireGraph {
    /// Build a graph, sorting questions by ordinal.
    ///
    /// Ordinals must be 1-based, unique and contiguous, question ids unique,
    /// and every answer must name the question that holds it.
    pub fn new(
        questionnaire: QuestionnaireInfo,
        mut questions: Vec<Question>,
    ) -> Result<Self, CoreError> {
        questions.sort_by_key(|q| q.order);

        let mut index = HashMap::with_capacity(questions.len());
        for (pos, question) in questions.iter().enumerate() {
            let expected = pos as i32 + 1;
            if question.order != expected {
                return Err(CoreError::Validation(format!(
                    "Question ordinals must be contiguous from 1: expected {expected}, \
                     found {} on question {}",
                    question.order, question.id
                )));
            }
            if index.insert(question.id, pos).is_some() {
                return Err(CoreError::Validation(format!(
                    "Question {} appears more than once",
                    question.id
                )));
            }
            if let Some(stray) = question.answers.iter().find(|a| a.question_id != question.id) {
                return Err(CoreError::Validation(format!(
                    "Answer {} belongs to question {}, not {}",
                    stray.id, stray.question_id, question.id
                )));
            }
        }

        Ok(Self {
            questionnaire,
            questions,
            index,
        })
    }

    pub fn questionnaire(&self) -> &QuestionnaireInfo {
        &self.questionnaire
    }

    /// All questions, ordered by ordinal.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Look up a question by identity.
    pub fn question(&self, id: DbId) -> Option<&Question> {
        self.index.get(&id).map(|&pos| &self.questions[pos])
    }

    /// Answers of a question in authoring order (empty if unknown).
    pub fn answers_of(&self, question_id: DbId) -> &[Answer] {
        self.question(question_id)
            .map(|q| q.answers.as_slice())
            .unwrap_or(&[])
    }

    /// The structurally last question (highest ordinal).
    pub fn last_question(&self) -> Option<&Question> {
        self.questions.last()
    }

    pub fn is_last(&self, question_id: DbId) -> bool {
        self.last_question().is_some_and(|q| q.id == question_id)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
