use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
#[cfg(test)]
use time::PrimitiveDateTime;

use crate::db::types::AnswerStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Quiz {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) per_question_marks: Option<f64>,
    pub(crate) negative_marks: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Problem {
    pub(crate) id: String,
    pub(crate) quiz_id: Option<String>,
    pub(crate) marks: Option<f64>,
    pub(crate) negative_marks: Option<f64>,
}

/// One graded answer inside an attempt's `answers` JSON array.
///
/// Decoding never fails: any element that is not an object, and any status
/// that is not the string `"right"`, becomes a wrong answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub(crate) struct Answer {
    pub(crate) question_id: Option<Value>,
    pub(crate) answer_status: Option<AnswerStatus>,
}

impl Answer {
    pub(crate) fn is_right(&self) -> bool {
        self.answer_status.is_some_and(AnswerStatus::is_right)
    }
}

impl From<Value> for Answer {
    fn from(value: Value) -> Self {
        let Value::Object(mut fields) = value else {
            return Self { question_id: None, answer_status: Some(AnswerStatus::Wrong) };
        };

        let answer_status = match fields.get("answer_status") {
            None | Some(Value::Null) => None,
            Some(status) => Some(AnswerStatus::from_json(status)),
        };
        let question_id = fields.remove("question_id").filter(|id| !id.is_null());

        Self { question_id, answer_status }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct StudentAttempt {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) quiz_id: String,
    pub(crate) answers: Json<Vec<Answer>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct CodeAttempt {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) problem_id: String,
    pub(crate) answers: Json<Vec<Answer>>,
}

/// Stored result row; the worker only writes these, tests read them back.
#[cfg(test)]
#[derive(Debug, Clone, FromRow)]
pub(crate) struct QuizResult {
    pub(crate) student_id: String,
    pub(crate) quiz_id: String,
    pub(crate) total_score: f64,
    pub(crate) total_correct: i64,
    pub(crate) total_attempt: i64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Answer;
    use crate::db::types::AnswerStatus;

    #[test]
    fn answer_without_status_is_wrong() {
        let answers: Vec<Answer> = serde_json::from_str(
            r#"[{"question_id": "q1", "answer_status": "right"},
                {"question_id": "q2", "answer_status": null},
                {"question_id": "q3"},
                {"answer_status": "partial", "selected": 2}]"#,
        )
        .unwrap();

        let rights: Vec<bool> = answers.iter().map(Answer::is_right).collect();
        assert_eq!(rights, vec![true, false, false, false]);
    }

    #[test]
    fn non_string_status_decodes_as_wrong() {
        let answers: Vec<Answer> = serde_json::from_str(
            r#"[{"answer_status": "right"},
                {"answer_status": 0},
                {"answer_status": true},
                {"answer_status": {"value": "right"}},
                {"question_id": {"$oid": "65f0"}, "answer_status": "right"}]"#,
        )
        .unwrap();

        let rights: Vec<bool> = answers.iter().map(Answer::is_right).collect();
        assert_eq!(rights, vec![true, false, false, false, true]);
        assert_eq!(answers[1].answer_status, Some(AnswerStatus::Wrong));
        assert_eq!(answers[4].question_id, Some(json!({ "$oid": "65f0" })));
    }

    #[test]
    fn non_object_elements_count_as_wrong_answers() {
        let answers: Vec<Answer> =
            serde_json::from_str(r#"[null, 3, "right", [], {"answer_status": "right"}]"#).unwrap();

        assert_eq!(answers.len(), 5);
        let rights: Vec<bool> = answers.iter().map(Answer::is_right).collect();
        assert_eq!(rights, vec![false, false, false, false, true]);
        assert!(answers[..4].iter().all(|a| a.answer_status == Some(AnswerStatus::Wrong)));
    }
}
