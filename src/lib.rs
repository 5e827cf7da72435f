//! Forgehand: adaptive automation of a web-based low-code platform.
//!
//! The workspace crates under `crates/` carry the machinery; this crate
//! wires them into a service, an HTTP surface and a CLI. The library
//! surface exists for the binary and the integration tests.

pub mod config;
pub mod errors;
pub mod server;
pub mod service;

pub use config::ForgehandConfig;
pub use errors::ApiError;
pub use service::ForgehandService;
