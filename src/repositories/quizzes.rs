use sqlx::PgPool;

use crate::db::models::Quiz;

pub(crate) const COLUMNS: &str = "id, title, per_question_marks, negative_marks";

pub(crate) async fn find_by_id(pool: &PgPool, quiz_id: &str) -> Result<Option<Quiz>, sqlx::Error> {
    sqlx::query_as::<_, Quiz>(&format!("SELECT {COLUMNS} FROM quizzes WHERE id = $1"))
        .bind(quiz_id)
        .fetch_optional(pool)
        .await
}

#[cfg(test)]
pub(crate) async fn create(pool: &PgPool, quiz: &Quiz) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO quizzes (id, title, per_question_marks, negative_marks)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&quiz.id)
    .bind(&quiz.title)
    .bind(quiz.per_question_marks)
    .bind(quiz.negative_marks)
    .execute(pool)
    .await?;

    Ok(())
}
