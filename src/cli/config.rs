use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use super::output::{emit, OutputFormat};
use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration, environment overrides included
    Show,

    /// Validate configuration
    Validate,
}

#[derive(Serialize)]
struct ValidationReport {
    path: String,
    file_present: bool,
    resources: usize,
    valid: bool,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let path = ctx.config_path();
    match args.action {
        ConfigAction::Show => emit(output, ctx.config(), |config| {
            format!(
                "Current configuration ({}):\n{}",
                path.display(),
                serde_yaml::to_string(config).unwrap_or_default()
            )
        })?,
        ConfigAction::Validate => {
            ctx.config()
                .validate()
                .with_context(|| format!("validating {}", path.display()))?;
            let report = ValidationReport {
                path: path.display().to_string(),
                file_present: path.exists(),
                resources: ctx.config().resources.len(),
                valid: true,
            };
            emit(output, &report, |report| {
                if report.file_present {
                    format!(
                        "Configuration file {} is valid ({} resources)",
                        report.path, report.resources
                    )
                } else {
                    format!(
                        "No configuration file at {}; defaults are valid",
                        report.path
                    )
                }
            })?;
        }
    }

    Ok(())
}
