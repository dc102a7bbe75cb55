use sqlx::Row;

fn database_url() -> Option<String> {
    std::env::var("QUIZ_SCORING_TEST_DATABASE_URL").ok().filter(|url| !url.trim().is_empty())
}

#[tokio::test]
async fn migrations_apply_and_scoring_tables_exist() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("QUIZ_SCORING_TEST_DATABASE_URL not set; skipping migration smoke test");
        return Ok(());
    };

    let pool =
        sqlx::postgres::PgPoolOptions::new().max_connections(1).connect(&database_url).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new("migrations")).await?;
    migrator.run(&pool).await?;

    let tables = ["quizzes", "problems", "student_attempts", "code_attempts", "quiz_results"];
    for table in tables {
        let row = sqlx::query("SELECT to_regclass($1)::text").bind(table).fetch_one(&pool).await?;
        let regclass: Option<String> = row.try_get(0)?;
        assert!(regclass.is_some(), "expected table {table} to exist after migrations");
    }

    let key_columns: Vec<String> = sqlx::query_scalar(
        "SELECT a.attname::text FROM pg_index i \
         JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
         WHERE i.indrelid = 'quiz_results'::regclass AND i.indisprimary \
         ORDER BY a.attname",
    )
    .fetch_all(&pool)
    .await?;
    assert_eq!(key_columns, vec!["quiz_id".to_string(), "student_id".to_string()]);

    Ok(())
}
