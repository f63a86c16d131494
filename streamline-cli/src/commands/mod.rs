//! CLI command implementations.

pub mod download;
pub mod profiles;
pub mod request;
