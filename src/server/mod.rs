mod error;
mod router;
mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::ServeState;
