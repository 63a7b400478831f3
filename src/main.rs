// src/main.rs

use anyhow::Context;
use parabuild::{cli, logging, run};
use tracing::warn;

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("parabuild error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;

    // The build blocks on pool batches, so it gets a thread of its own.
    let build = tokio::task::spawn_blocking(move || run(args));

    tokio::select! {
        joined = build => joined.context("build thread panicked")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl+C")?;
            warn!("interrupted; abandoning running tasks");
            std::process::exit(130);
        }
    }
}
