pub mod cli;
pub mod config;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod infer;
pub mod inspect;
pub mod io_utils;
pub mod multi_upload;
pub mod naming;
pub mod onboard;
pub mod payload;
pub mod profile;
pub mod reconcile;
pub mod session;
pub mod sheet;
pub mod store;
pub mod table;
pub mod upload;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug};

use crate::{
    cli::{Cli, Commands},
    config::AppConfig,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_onboard", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref())?
        .with_overrides(cli.database, cli.page_size)?;
    debug!("Effective configuration: {config:?}");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Starting async runtime")?;
    runtime.block_on(async {
        match &cli.command {
            Commands::Infer(args) => inspect::execute(args, &config),
            Commands::Onboard(args) => onboard::execute(args, &config).await,
            Commands::Dashboard(args) => dashboard::execute(args, &config).await,
            Commands::View(args) => dashboard::execute_view(args, &config).await,
            Commands::Upload(args) => multi_upload::execute(args, &config).await,
        }
    })
}
