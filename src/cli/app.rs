use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use super::commands::Commands;
use super::context::CliContext;
use super::env::CliArgs;
use super::runtime::{init_logging, load_config, LoadedConfig};
use super::{cmd_check_acl, cmd_print_config, cmd_serve};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    init_logging(&cli.log_level, cli.debug, cli.json_logs)?;

    info!("Starting docgate v{}", env!("CARGO_PKG_VERSION"));

    let LoadedConfig { config, path } = load_config(cli.config.as_ref()).await?;
    let ctx = CliContext::new(config, path);

    let result = match cli.command {
        Commands::Serve(args) => cmd_serve(args, &ctx).await,
        Commands::CheckAcl(args) => cmd_check_acl(args),
        Commands::PrintConfig => cmd_print_config(&ctx),
    };
    match result {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
