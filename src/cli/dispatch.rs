use super::config::cmd_config;
use super::env::CliArgs;
use super::inspect::cmd_inspect;
use super::reserve::cmd_reserve;
use super::serve::cmd_serve;
use super::sync::cmd_sync;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    let output = cli.output;
    match cli.command.clone() {
        Commands::Serve(args) => cmd_serve(args, ctx).await,
        Commands::Sync(args) => cmd_sync(args, ctx, output).await,
        Commands::Reserve(args) => cmd_reserve(args, ctx, output).await,
        Commands::Inspect(args) => cmd_inspect(args, ctx, output).await,
        Commands::Config(args) => cmd_config(args, ctx, output).await,
    }
}
