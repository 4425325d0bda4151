#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Expiring cache implementation for quote series.
//!
//! - [`ExpiringCache`] - `RwLock`-guarded map with absolute per-entry TTL

/// In-memory expiring cache.
pub mod memory;

pub use memory::{DEFAULT_TTL, ExpiringCache};
