// src/main.rs

use taskdispatch::{cli, exit_code, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("taskdispatch error: {err:?}");
        std::process::exit(exit_code(&err));
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
