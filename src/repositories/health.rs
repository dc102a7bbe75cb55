use std::time::{Duration, Instant};

use sqlx::PgPool;

/// Round-trips a trivial query, acquiring (and if needed re-opening) a pooled
/// connection. Returns the observed latency.
pub(crate) async fn ping(pool: &PgPool) -> Result<Duration, sqlx::Error> {
    let started = Instant::now();
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(started.elapsed())
}
