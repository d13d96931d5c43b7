use anyhow::{bail, Result};
use clap::Args;
use quota_engine::SyncTarget;
use quota_lock::OpContext;
use serde::Serialize;

use super::output::{emit, quota_failure, OutputFormat};
use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct SyncArgs {
    /// Resource name
    #[arg(long, short = 'r')]
    pub resource: Option<String>,

    /// Associated account ID (repeat for several)
    #[arg(long = "account", short = 'a', value_name = "ID")]
    pub accounts: Vec<String>,

    /// Every account named in the configuration, optionally limited to `--resource`
    #[arg(long, conflicts_with = "accounts")]
    pub all: bool,

    /// Only resync records older than `accounting.refresh_interval_secs`
    #[arg(long)]
    pub stale: bool,
}

#[derive(Serialize)]
struct SyncReport {
    requested: usize,
    refreshed: usize,
}

pub async fn cmd_sync(args: SyncArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let service = ctx.service().await?;
    let targets: Vec<SyncTarget> = if args.all {
        service
            .configured_targets()
            .into_iter()
            .filter(|target| args.resource.as_ref().map_or(true, |name| &target.name == name))
            .collect()
    } else {
        let Some(resource) = args.resource.as_ref() else {
            bail!("--resource is required unless --all is given");
        };
        if args.accounts.is_empty() {
            bail!("at least one --account is required unless --all is given");
        }
        args.accounts
            .iter()
            .map(|account| SyncTarget::new(account.clone(), resource.clone()))
            .collect()
    };

    let op = OpContext::new();
    let refreshed = if args.stale {
        service
            .manager()
            .refresh_stale(&op, &targets, ctx.config().accounting.refresh_interval())
            .await
            .map_err(quota_failure)?
    } else {
        service
            .manager()
            .sync(&op, &targets)
            .await
            .map_err(quota_failure)?;
        targets.len()
    };

    let report = SyncReport {
        requested: targets.len(),
        refreshed,
    };
    emit(output, &report, |report| {
        format!(
            "Synced {} of {} record(s)",
            report.refreshed, report.requested
        )
    })
}
