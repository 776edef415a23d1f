//! Answer entity model.
//!
//! The destination is stored as a type column plus one nullable column per
//! variant payload.

use qpub_core::error::CoreError;
use qpub_core::graph::{self, Destination};
use qpub_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `answers` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Answer {
    pub id: DbId,
    pub question_id: DbId,
    pub content: String,
    pub sort_order: i32,
    pub destination_type: String,
    pub destination_question_id: Option<DbId>,
    pub destination_url: Option<String>,
    pub destination_content_id: Option<DbId>,
    pub priority: Option<i32>,
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Answer {
    /// Decode the destination columns. A type whose payload column is empty
    /// is an integrity fault.
    pub fn destination(&self) -> Result<Destination, CoreError> {
        let missing = |column: &str| {
            CoreError::Integrity(format!(
                "Answer {} has destination type '{}' but no {column}",
                self.id, self.destination_type
            ))
        };
        match self.destination_type.as_str() {
            "none" => Ok(Destination::None),
            "question" => self
                .destination_question_id
                .map(|question_id| Destination::Question { question_id })
                .ok_or_else(|| missing("destination_question_id")),
            "external_link" => self
                .destination_url
                .clone()
                .map(|url| Destination::ExternalLink { url })
                .ok_or_else(|| missing("destination_url")),
            "custom_content" => self
                .destination_content_id
                .map(|content_id| Destination::CustomContent { content_id })
                .ok_or_else(|| missing("destination_content_id")),
            other => Err(CoreError::Integrity(format!(
                "Answer {} has unknown destination type '{other}'",
                self.id
            ))),
        }
    }

    /// Convert into the graph representation.
    pub fn to_graph(&self) -> Result<graph::Answer, CoreError> {
        Ok(graph::Answer {
            id: self.id,
            question_id: self.question_id,
            content: self.content.clone(),
            destination: self.destination()?,
            priority: self.priority,
        })
    }
}
