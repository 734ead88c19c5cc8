//! agentloom: chat, plan and execute against a local model

use clap::Parser;

use agentloom::cli::{self, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = cli::resolve_settings(args.global.config.as_deref(), &args.global)?;
    let log_guard = cli::init_tracing(&settings, args.global.json_logs);

    let code = cli::run(args, settings).await?;
    // Flush the file writer before exiting
    drop(log_guard);
    std::process::exit(code);
}
