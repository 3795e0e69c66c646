//! # Runtime
//!
//! Process startup and the per-kind watch loops.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server, stores and clients
//! - `watch_loop`: one `kube_runtime::Controller` per managed kind
//! - `error_policy`: reconcile and watch stream error handling

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
