//! # Controller
//!
//! - `backoff`: per-resource exponential backoff for failed reconciles
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod server;
