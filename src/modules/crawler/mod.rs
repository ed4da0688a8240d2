//! Peer crawling: the digest pipeline and the long-lived discovery,
//! digestion and liveness tasks.

pub mod digest;
pub mod service;

pub use digest::{Digester, DigestError, PeerRecord, MAX_RETRIES};
pub use service::CrawlerService;
