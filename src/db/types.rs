use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Grading status stored on every answer. Anything other than `"right"`,
/// including a missing status, counts as wrong.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum AnswerStatus {
    Right,
    #[default]
    #[serde(other)]
    Wrong,
}

impl AnswerStatus {
    pub(crate) fn is_right(self) -> bool {
        matches!(self, Self::Right)
    }

    /// Reads a stored status of any JSON type; only the string `"right"` is right.
    pub(crate) fn from_json(value: &Value) -> Self {
        match value {
            Value::String(status) if status == "right" => Self::Right,
            _ => Self::Wrong,
        }
    }
}
