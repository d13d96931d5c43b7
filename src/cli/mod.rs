pub mod app;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod inspect;
pub mod output;
pub mod reserve;
pub mod runtime;
pub mod serve;
pub mod sync;

pub use config::{cmd_config, ConfigArgs};
pub use inspect::{cmd_inspect, InspectArgs};
pub use reserve::{cmd_reserve, ReserveArgs};
pub use serve::{cmd_serve, ServeArgs};
pub use sync::{cmd_sync, SyncArgs};
