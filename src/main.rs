#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = quiz_scoring::run_worker().await {
        eprintln!("quiz-scoring fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
