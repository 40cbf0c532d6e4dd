//! Domain layer: core models, ports and error types for kasmos.
//!
//! Nothing in this module touches tokio, the filesystem, or a subprocess —
//! that's what `infrastructure` and `application` are for.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{KasmosError, KasmosResult};
