use std::time::Duration;

use anyhow::Result;
use clap::Args;
use quota_engine::Param;
use quota_lock::OpContext;
use serde::Serialize;
use tracing::info;

use super::inspect::render_record;
use super::output::{emit, quota_failure, OutputFormat};
use crate::cli::context::CliContext;
use crate::service::RecordView;

#[derive(Args, Clone, Debug)]
pub struct ReserveArgs {
    /// Resource name
    #[arg(long, short = 'r')]
    pub resource: String,

    /// Associated account ID
    #[arg(long, short = 'a', value_name = "ID")]
    pub account: String,

    /// Amount to reserve
    #[arg(long, short = 'n')]
    pub num: u64,

    /// Roll the reservation back instead of committing it
    #[arg(long)]
    pub rollback: bool,

    /// Keep the reservation open this long before finishing it
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub hold_ms: u64,
}

#[derive(Serialize)]
struct ReserveReport {
    outcome: &'static str,
    record: RecordView,
}

pub async fn cmd_reserve(args: ReserveArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let service = ctx.service().await?;
    let op = OpContext::new();
    let params = [Param::new(args.account.clone(), args.resource.clone(), args.num)];

    let reservation = service
        .manager()
        .begin(&op, &params)
        .await
        .map_err(quota_failure)?;
    if reservation.is_noop() {
        info!(account = %args.account, "reservation skipped; quota not enforced");
    }
    if args.hold_ms > 0 {
        tokio::time::sleep(Duration::from_millis(args.hold_ms)).await;
    }
    let outcome = if args.rollback {
        reservation.rollback(&op).await.map_err(quota_failure)?;
        "rolled back"
    } else {
        reservation.finally(&op).await.map_err(quota_failure)?;
        "committed"
    };

    let record = service
        .inspect(&args.resource, &args.account)
        .await
        .map_err(quota_failure)?;
    emit(output, &ReserveReport { outcome, record }, |report| {
        format!("Reservation {}; {}", report.outcome, render_record(&report.record))
    })
}
