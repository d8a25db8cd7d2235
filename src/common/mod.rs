//! Ambient utilities: configuration, error types, logging, paths

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use config::{AdapterConfig, AdapterKind, AdapterRegistry, Config};
pub use error::{Error, FatalSessionError, Result};
