use clap::Subcommand;

use super::config::ConfigArgs;
use super::inspect::InspectArgs;
use super::reserve::ReserveArgs;
use super::serve::ServeArgs;
use super::sync::SyncArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Serve the forced-sync HTTP endpoint
    Serve(ServeArgs),

    /// Push authoritative figures into the accounting cache
    Sync(SyncArgs),

    /// Reserve quota once, then commit or roll it back
    Reserve(ReserveArgs),

    /// Show the cached record of one account
    Inspect(InspectArgs),

    /// Show or validate the effective configuration
    Config(ConfigArgs),
}
