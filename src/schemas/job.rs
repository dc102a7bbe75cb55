use serde::{Deserialize, Serialize};
use validator::Validate;

/// Payload carried by every job on the scoring queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub(crate) struct ScoringJobPayload {
    #[serde(alias = "quizId")]
    #[validate(length(min = 1, max = 128, message = "quiz_id must be 1-128 characters"))]
    pub(crate) quiz_id: String,
}

impl ScoringJobPayload {
    /// Trims and validates a quiz id.
    pub(crate) fn new(quiz_id: impl Into<String>) -> Result<Self, String> {
        let payload = Self { quiz_id: quiz_id.into().trim().to_string() };
        payload.validate().map_err(|err| format!("invalid scoring payload: {err}"))?;

        Ok(payload)
    }

    /// Decodes and validates a raw job payload. Unknown fields are ignored.
    pub(crate) fn parse(value: &serde_json::Value) -> Result<Self, String> {
        let payload: Self = serde_json::from_value(value.clone())
            .map_err(|err| format!("malformed scoring payload: {err}"))?;

        Self::new(payload.quiz_id)
    }
}
