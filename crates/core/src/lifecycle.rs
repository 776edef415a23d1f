//! Publish state and version numbering rules.
//!
//! A questionnaire is either a `Draft` or `Published`. Publishing always
//! appends version `current + 1`; unpublishing discards the current version
//! and steps the counter back by one. Versions are never renumbered.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Version;

/// Version counter value before the first publish.
pub const UNPUBLISHED_VERSION: Version = 0;

/// Publish state of a questionnaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    #[default]
    Draft,
    Published,
}

impl PublishState {
    /// String representation for logging and database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    /// Parse from the database `state` column.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            other => Err(CoreError::Integrity(format!(
                "Unknown publish state '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for PublishState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The version number a publish will create.
pub fn next_version(current: Version) -> Result<Version, CoreError> {
    if current < UNPUBLISHED_VERSION {
        return Err(CoreError::Integrity(format!(
            "Version counter is negative ({current})"
        )));
    }
    current
        .checked_add(1)
        .ok_or_else(|| CoreError::Integrity("Version counter overflow".into()))
}

/// The version whose snapshot a new version is diffed against, if any.
pub fn predecessor(version: Version) -> Option<Version> {
    (version > 1).then(|| version - 1)
}

/// What an unpublish request has to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpublishPlan {
    /// Nothing is published; the request succeeds without changes.
    AlreadyDraft,
    /// Drop the snapshot at `discard_version` and step the counter back.
    Rollback {
        discard_version: Version,
        restored_version: Version,
    },
}

/// Decide what unpublishing a questionnaire in `state` at `version` means.
pub fn plan_unpublish(state: PublishState, version: Version) -> Result<UnpublishPlan, CoreError> {
    match state {
        PublishState::Draft => Ok(UnpublishPlan::AlreadyDraft),
        PublishState::Published if version <= UNPUBLISHED_VERSION => Err(CoreError::Integrity(
            format!("Questionnaire is published but its version counter is {version}"),
        )),
        PublishState::Published => Ok(UnpublishPlan::Rollback {
            discard_version: version,
            restored_version: version - 1,
        }),
    }
}
