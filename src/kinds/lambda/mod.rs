//! # Lambda Adapters
//!
//! - `permission.rs` - `Permission` (one statement of a function's resource policy)
//! - `policy.rs` - policy document parsing

pub mod permission;
pub mod policy;

pub use permission::PermissionHooks;
