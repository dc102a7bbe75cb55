use sqlx::PgPool;

use crate::db::models::Problem;

pub(crate) const COLUMNS: &str = "id, quiz_id, marks, negative_marks";

pub(crate) async fn list_by_ids(
    pool: &PgPool,
    problem_ids: &[String],
) -> Result<Vec<Problem>, sqlx::Error> {
    if problem_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Problem>(&format!("SELECT {COLUMNS} FROM problems WHERE id = ANY($1)"))
        .bind(problem_ids)
        .fetch_all(pool)
        .await
}

#[cfg(test)]
pub(crate) async fn create(pool: &PgPool, problem: &Problem) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO problems (id, quiz_id, marks, negative_marks)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&problem.id)
    .bind(&problem.quiz_id)
    .bind(problem.marks)
    .bind(problem.negative_marks)
    .execute(pool)
    .await?;

    Ok(())
}
