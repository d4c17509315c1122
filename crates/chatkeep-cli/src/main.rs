use anyhow::Result;
use chatkeep_cli::{run, Cli};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut settings = chatkeep_core::Settings::load();
    cli.apply_overrides(&mut settings);

    run(cli, settings).await
}
