//! AWS Resource Controller Library
//!
//! Kubernetes controller that keeps declarative AWS resources (RDS, Batch,
//! DynamoDB, Lambda) in sync with their remote state.
//! Tests are included in the module files and under `tests/`.
//!
//! ## Layout
//!
//! - `managed` - the kind-agnostic reconcile engine
//! - `kinds` - one adapter per reconciled kind
//! - `provider` - AWS service traits and SDK-backed clients
//! - `crd` - custom resource types
//! - `store` - cluster object and secret access
//! - `runtime` - startup and watch loops

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod kinds;
pub mod managed;
pub mod observability;
pub mod provider;
pub mod runtime;
pub mod store;
