use futures::stream::BoxStream;
use sqlx::PgPool;

use crate::db::models::StudentAttempt;

/// Forward-only cursor over the attempts recorded for one quiz, in insertion
/// order. Rows are decoded one at a time as the stream is polled.
pub(crate) fn stream_by_quiz<'a>(
    pool: &'a PgPool,
    quiz_id: &'a str,
) -> BoxStream<'a, Result<StudentAttempt, sqlx::Error>> {
    sqlx::query_as::<_, StudentAttempt>(
        "SELECT id, student_id, quiz_id, answers
         FROM student_attempts
         WHERE quiz_id = $1
         ORDER BY created_at, id",
    )
    .bind(quiz_id)
    .fetch(pool)
}

#[cfg(test)]
pub(crate) async fn create(pool: &PgPool, attempt: &StudentAttempt) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO student_attempts (id, student_id, quiz_id, answers)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&attempt.id)
    .bind(&attempt.student_id)
    .bind(&attempt.quiz_id)
    .bind(&attempt.answers)
    .execute(pool)
    .await?;

    Ok(())
}
