//! IO modules - side effects (network, filesystem)

pub mod digest;
pub mod extract;
pub mod fetch;
