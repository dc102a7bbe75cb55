use std::env;

use anyhow::{anyhow, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let quiz_id = parse_args()?;

    match quiz_scoring::enqueue_scoring_job(&quiz_id).await {
        Ok(job_id) => {
            println!("{job_id}");
            Ok(())
        }
        Err(err) => {
            eprintln!("enqueue-scoring fatal: {err:#}");
            std::process::exit(1);
        }
    }
}

fn parse_args() -> Result<String> {
    let mut quiz_id = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--quiz" => {
                quiz_id = Some(args.next().ok_or_else(|| anyhow!("--quiz missing value"))?);
            }
            "-h" | "--help" => {
                println!("usage: enqueue-scoring --quiz <QUIZ_ID>");
                std::process::exit(0);
            }
            _ => return Err(anyhow!("Unknown argument: {arg}")),
        }
    }

    quiz_id.ok_or_else(|| anyhow!("--quiz is required"))
}
