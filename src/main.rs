// src/main.rs

use testdag::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(failed) if failed > 0 => std::process::exit(1),
        Ok(_) => {}
        Err(err) => {
            eprintln!("testdag error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<usize> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    let summary = run(args).await?;
    Ok(summary.failed)
}
