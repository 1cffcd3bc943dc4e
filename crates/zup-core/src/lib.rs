//! Engine behind the `zup` toolchain updater.

pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod http;
pub mod index;
pub mod io;
pub mod swap;
pub mod update;

pub use config::{ChecksumPolicy, Config};
pub use context::Context;
pub use error::{Error, Result};
pub use http::{HttpClient, ReqwestClient};
pub use update::{UpdateOutcome, update};

/// User Agent string for outgoing requests
pub const USER_AGENT: &str = concat!("zup/", env!("CARGO_PKG_VERSION"));
