use anyhow::Result;
use clap::Args;

use super::output::{emit, quota_failure, OutputFormat};
use crate::cli::context::CliContext;
use crate::service::RecordView;

#[derive(Args, Clone, Debug)]
pub struct InspectArgs {
    /// Resource name
    #[arg(long, short = 'r')]
    pub resource: String,

    /// Associated account ID
    #[arg(long, short = 'a', value_name = "ID")]
    pub account: String,
}

pub async fn cmd_inspect(args: InspectArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let service = ctx.service().await?;
    let view = service
        .inspect(&args.resource, &args.account)
        .await
        .map_err(quota_failure)?;
    emit(output, &view, render_record)
}

pub(crate) fn render_record(view: &RecordView) -> String {
    match (view.used, view.quota) {
        (Some(used), Some(quota)) => format!(
            "{} {}: used {}/{} (refreshed {})",
            view.resource,
            view.associated_id,
            used,
            quota,
            view.refreshed_at.as_deref().unwrap_or("never")
        ),
        _ => format!(
            "{} {}: no cached record at {}",
            view.resource, view.associated_id, view.key
        ),
    }
}
