//! Stable error domain shared by every quota crate.
//!
//! Each crate wraps [`ErrorObj`](model::ErrorObj) in its own error newtype;
//! the code registry here is the single place HTTP status, retry class and
//! severity are decided.

pub mod class;
pub mod code;
#[cfg(feature = "http")]
pub mod mapping_http;
pub mod model;
pub mod prelude;
pub mod render;
