use anyhow::Result;
use clap::Parser;
use subscription_sync::{cli, config::config_loader};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("subscription-sync exited with error: {:#}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    subscription_sync::observability::init_observability("subscription-sync")?;

    let command = cli::Cli::parse().command;

    let dotenvy_env = config_loader::load()?;
    info!(stage = %dotenvy_env.stage, "ENV has been loaded");

    let services = cli::Services::build(&dotenvy_env).await?;
    services.execute(command).await
}
