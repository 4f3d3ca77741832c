/// Fingerpost - WebFinger Directory Server
///
/// Resolves portable account locators (`acct:user@domain`) to published
/// profile records for federated-identity discovery, over a dual-indexed
/// record store with pluggable persistence.

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod idcodec;
pub mod model;
pub mod server;
pub mod service;
pub mod store;
