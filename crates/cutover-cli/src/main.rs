//! Cutover Command-Line Client
//!
//! Operator tool for tracking migrations, preparing and executing rollback
//! plans, evaluating rollback triggers and validating migrated data.

mod commands;
mod config;
mod error;
mod formatter;

use clap::Parser;
use config::Args;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    // Logs go to stderr so stdout stays parseable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cutover_core=info,cutover_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let formatter = formatter::create_formatter(args.global.format);
    let config = args.global.into_config();

    tracing::debug!(data_path = %config.data_path.display(), "configuration loaded");

    let result = commands::Context::open(&config)
        .and_then(|ctx| commands::execute(&ctx, args.command));

    match result {
        Ok(output) => {
            println!("{}", formatter.format_value(&output.value));
            if output.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("{}", formatter.format_error(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}
