use std::collections::HashMap;

use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

#[cfg(test)]
use crate::db::models::QuizResult;

pub(crate) const COLUMNS: &str = "\
    student_id, quiz_id, total_score, total_correct, total_attempt, created_at, updated_at";

/// Full replacement of one student's result for one quiz.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResultUpsert {
    pub(crate) student_id: String,
    pub(crate) quiz_id: String,
    pub(crate) total_score: f64,
    pub(crate) total_correct: i64,
    pub(crate) total_attempt: i64,
}

impl ResultUpsert {
    fn key(&self) -> (&str, &str) {
        (self.student_id.as_str(), self.quiz_id.as_str())
    }
}

/// Writes one batch with a single statement. Every entry either inserts a new
/// row or replaces the three totals of the existing `(student_id, quiz_id)` row.
/// Returns the number of rows touched.
pub(crate) async fn bulk_upsert(
    pool: &PgPool,
    entries: &[ResultUpsert],
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let entries = collapse_duplicate_keys(entries);
    if entries.is_empty() {
        return Ok(0);
    }

    let mut builder =
        QueryBuilder::<Postgres>::new(format!("INSERT INTO quiz_results ({COLUMNS}) "));
    builder.push_values(entries, |mut row, entry| {
        row.push_bind(entry.student_id.as_str())
            .push_bind(entry.quiz_id.as_str())
            .push_bind(entry.total_score)
            .push_bind(entry.total_correct)
            .push_bind(entry.total_attempt)
            .push_bind(now)
            .push_bind(now);
    });
    builder.push(
        " ON CONFLICT (student_id, quiz_id) DO UPDATE
          SET total_score = EXCLUDED.total_score,
              total_correct = EXCLUDED.total_correct,
              total_attempt = EXCLUDED.total_attempt,
              updated_at = EXCLUDED.updated_at",
    );

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
pub(crate) async fn list_by_quiz(
    pool: &PgPool,
    quiz_id: &str,
) -> Result<Vec<QuizResult>, sqlx::Error> {
    sqlx::query_as::<_, QuizResult>(&format!(
        "SELECT {COLUMNS} FROM quiz_results WHERE quiz_id = $1 ORDER BY student_id"
    ))
    .bind(quiz_id)
    .fetch_all(pool)
    .await
}

/// Postgres rejects an upsert that touches the same row twice, so repeated keys
/// inside one batch are reduced to their last occurrence.
fn collapse_duplicate_keys(entries: &[ResultUpsert]) -> Vec<&ResultUpsert> {
    let mut last_seen = HashMap::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        last_seen.insert(entry.key(), index);
    }

    entries
        .iter()
        .enumerate()
        .filter(|(index, entry)| last_seen.get(&entry.key()) == Some(index))
        .map(|(_, entry)| entry)
        .collect()
}
