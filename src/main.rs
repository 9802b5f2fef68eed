//! OCR layout worker - Entry point
//!
//! Long-lived JSON-lines worker by default; `ocr`, `pdf-text` and `document`
//! run a single job and print one JSON object.

use clap::Parser;
use ocr_layout_worker::cli::{failure_value, run_one_shot, Cli, Command};
use ocr_layout_worker::Worker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Stdout carries responses, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ocr_layout_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.config.into_config();

    match cli.command.unwrap_or(Command::Worker) {
        Command::Worker => {
            tracing::info!(engine = %config.engine_name, "Starting OCR worker");
            let mut worker = Worker::new(config.backend_factory(), config.recognizer_options());
            if config.warmup {
                worker.warm_up().await;
            }
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            worker.run(stdin, tokio::io::stdout()).await?;
            Ok(())
        }
        command => {
            let outcome = tokio::task::spawn_blocking(move || run_one_shot(&config, &command)).await?;
            match outcome {
                Ok(value) => {
                    println!("{}", serde_json::to_string(&value)?);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(error = %e, "Command failed");
                    println!("{}", failure_value(&e));
                    std::process::exit(1);
                }
            }
        }
    }
}
