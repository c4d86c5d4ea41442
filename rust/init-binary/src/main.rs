use clap::{crate_description, crate_version, Parser};
use mysql_init_config::{InitConfig, LOG_FILTER_ENV};
use tracing_subscriber::EnvFilter;

use crate::init_controller::{Ctx, EngineOptions};

mod client;
mod command;
mod init_controller;
mod password;
mod seed;
mod server;
mod timezone;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[derive(clap::Parser)]
#[clap(about, author)]
struct Opts {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Initialize a fresh data directory and provision accounts and
    /// databases from the environment, then stop again so the real service
    /// supervisor can take over.
    Run(EngineOptions),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    match opts.cmd {
        Command::Run(engine) => {
            initialize_logging();
            tracing::info!(
                built_time = built_info::BUILT_TIME_UTC,
                rustc = built_info::RUSTC_VERSION,
                "starting {description} {version}",
                description = crate_description!(),
                version = crate_version!(),
            );

            let ctx = Ctx {
                config: InitConfig::from_env(),
                engine,
            };
            init_controller::run_initialization(&ctx).await?;
        }
    }

    Ok(())
}

fn initialize_logging() {
    // Narration goes to stdout; fatal errors reach stderr through main.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
