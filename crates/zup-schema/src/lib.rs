//! Shared types for zup.
//!
//! Everything here is pure data and classification logic: no network, no
//! filesystem. The engine in `zup-core` builds on these types.

pub mod codec;
pub mod platform;
pub mod types;

// Re-exports
pub use codec::{ArchiveCodec, CodecError};
pub use platform::Platform;
pub use types::*;
