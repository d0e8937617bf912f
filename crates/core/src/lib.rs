// lightq Core - Domain, Ports & Worker Runtime
// NO infrastructure dependencies: storage engines and OS process control live in infra crates.

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
