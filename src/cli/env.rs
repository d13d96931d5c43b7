use clap::Parser;
use std::path::PathBuf;

use super::commands::Commands;
use super::output::OutputFormat;
use super::runtime::LogFormat;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable debug mode
    #[arg(short, long)]
    pub debug: bool,

    /// Log line format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_flags_parse() {
        let cli = CliArgs::try_parse_from([
            "quotad",
            "--output",
            "json",
            "reserve",
            "--resource",
            "CPU",
            "--account",
            "acctA",
            "--num",
            "2",
            "--rollback",
        ])
        .unwrap();
        assert!(matches!(cli.output, OutputFormat::Json));
        match cli.command {
            Commands::Reserve(args) => {
                assert_eq!((args.resource.as_str(), args.num), ("CPU", 2));
                assert!(args.rollback);
            }
            _ => panic!("expected reserve"),
        }
    }

    #[test]
    fn sync_all_conflicts_with_accounts() {
        assert!(CliArgs::try_parse_from(["quotad", "sync", "--all", "--account", "a"]).is_err());
        let cli = CliArgs::try_parse_from(["quotad", "sync", "-r", "CPU", "-a", "a", "-a", "b"])
            .unwrap();
        match cli.command {
            Commands::Sync(args) => assert_eq!(args.accounts, ["a", "b"]),
            _ => panic!("expected sync"),
        }
    }
}
