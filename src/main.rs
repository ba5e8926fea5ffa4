// Allow common clippy pedantic lints
#![allow(clippy::must_use_candidate)]
#![allow(clippy::unused_async)]

//! Synchronized consumer CLI
//!
//! Consumes Kafka topics in step with another consumer group's commits

use clap::Parser;
use synchronized_consumer::cli::{Cli, Runner};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let runner = Runner::new(cli);

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(runner.log_level().into()),
        )
        .init();

    if let Err(e) = runner.run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
