//! Top-level application error.
//!
//! Module-local error enums live beside their modules; this type covers
//! the two paths that surface errors out of the process — startup in the
//! runner and the HTTP listener. Everything else recovers locally
//! (tombstones, retry counters, logged warnings), so only the failures
//! those paths actually produce appear here.

use thiserror::Error;

use crate::modules::gateway::GatewayError;
use crate::modules::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
