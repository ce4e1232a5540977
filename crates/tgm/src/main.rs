use clap::Parser;

use tgm_core::{config::Config, logging};

mod cli;
mod commands;
mod menu;
mod output;

use cli::Cli;
use commands::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = Config::load()?;
    let _guards = logging::init("tgm", &cfg.logging)?;
    tracing::info!("=== Telegram group manager starting ===");

    let app = App::connect(cfg).await?;
    let res = commands::run(&app, cli.command).await;
    if let Err(e) = &res {
        tracing::error!("{e:#}");
    }
    tracing::info!("=== Telegram group manager finished ===");
    res
}
