use qpub_core::branching::{DeadEndPolicy, DEFAULT_MAX_QUESTIONS};
use qpub_core::error::CoreError;

/// Publish pipeline configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Largest live graph a publish will validate (default: `500`).
    pub max_questions: usize,
    /// Which answers without a destination reject a publish
    /// (default: `last_question`).
    pub dead_end_policy: DeadEndPolicy,
    /// Retries of a persistence conflict before surfacing it (default: `2`).
    pub max_conflict_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_questions: DEFAULT_MAX_QUESTIONS,
            dead_end_policy: DeadEndPolicy::default(),
            max_conflict_retries: 2,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// Reads a `.env` file first if one is present.
    ///
    /// | Env Var                         | Default         |
    /// |---------------------------------|-----------------|
    /// | `PUBLISH_MAX_QUESTIONS`         | `500`           |
    /// | `PUBLISH_DEAD_END_POLICY`       | `last_question` |
    /// | `PUBLISH_MAX_CONFLICT_RETRIES`  | `2`             |
    pub fn from_env() -> Result<Self, CoreError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; missing keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let defaults = Self::default();

        let max_questions = match lookup("PUBLISH_MAX_QUESTIONS") {
            Some(raw) => parse_number(&raw, "PUBLISH_MAX_QUESTIONS")?,
            None => defaults.max_questions,
        };
        let dead_end_policy = match lookup("PUBLISH_DEAD_END_POLICY") {
            Some(raw) => DeadEndPolicy::from_name(raw.trim())?,
            None => defaults.dead_end_policy,
        };
        let max_conflict_retries = match lookup("PUBLISH_MAX_CONFLICT_RETRIES") {
            Some(raw) => parse_number(&raw, "PUBLISH_MAX_CONFLICT_RETRIES")?,
            None => defaults.max_conflict_retries,
        };

        Ok(Self {
            max_questions,
            dead_end_policy,
            max_conflict_retries,
        })
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T, CoreError> {
    raw.trim().parse().map_err(|_| {
        CoreError::Validation(format!("{key} must be a non-negative integer, got '{raw}'"))
    })
}
