use sqlx::PgPool;

use crate::db::models::CodeAttempt;

pub(crate) async fn list_all(pool: &PgPool) -> Result<Vec<CodeAttempt>, sqlx::Error> {
    sqlx::query_as::<_, CodeAttempt>(
        "SELECT id, student_id, problem_id, answers
         FROM code_attempts
         ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_by_quiz(
    pool: &PgPool,
    quiz_id: &str,
) -> Result<Vec<CodeAttempt>, sqlx::Error> {
    sqlx::query_as::<_, CodeAttempt>(
        "SELECT ca.id, ca.student_id, ca.problem_id, ca.answers
         FROM code_attempts ca
         JOIN problems p ON p.id = ca.problem_id
         WHERE p.quiz_id = $1
         ORDER BY ca.created_at, ca.id",
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
pub(crate) async fn create(pool: &PgPool, attempt: &CodeAttempt) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO code_attempts (id, student_id, problem_id, answers)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&attempt.id)
    .bind(&attempt.student_id)
    .bind(&attempt.problem_id)
    .bind(&attempt.answers)
    .execute(pool)
    .await?;

    Ok(())
}
