//! Questionnaire entity model.

use qpub_core::error::CoreError;
use qpub_core::graph::QuestionnaireInfo;
use qpub_core::lifecycle::PublishState;
use qpub_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `questionnaires` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Questionnaire {
    pub id: DbId,
    pub title: String,
    pub description: Option<String>,
    pub state: String,
    pub version: i32,
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Questionnaire {
    pub fn publish_state(&self) -> Result<PublishState, CoreError> {
        PublishState::from_name(&self.state)
    }

    /// Questionnaire-level fields carried into the graph.
    pub fn info(&self) -> QuestionnaireInfo {
        QuestionnaireInfo {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }
}
