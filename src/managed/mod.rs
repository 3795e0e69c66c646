//! # Managed Resource Engine
//!
//! The kind-agnostic machinery shared by every adapter.
//!
//! ## Module Structure
//!
//! - `reconciler.rs` - [`ManagedReconciler`], the observe/create/update/delete loop
//! - `external.rs` - [`ExternalClient`], [`Connector`] and the [`KindHooks`] skeleton
//! - `reference.rs` - cross-resource reference resolution
//! - `publisher.rs` - connection detail publishing
//! - `meta.rs` - finalizer, external-name and create annotations
//! - `conditions.rs` - `Ready`/`Synced` condition constructors
//! - `policy.rs` - management policy gate
//! - `error.rs` - [`ReconcilerError`]
//! - `patch.rs`, `pointer.rs`, `tags.rs` - diff and late-initialization helpers

pub mod conditions;
mod error;
pub mod external;
pub mod meta;
pub mod patch;
pub mod pointer;
pub mod policy;
pub mod publisher;
mod reconciler;
pub mod reference;
pub mod tags;

pub use error::ReconcilerError;
pub use external::{
    ConnectionDetails, Connector, ExternalClient, ExternalCreation, ExternalError,
    ExternalObservation, ExternalUpdate, Hooked, KindHooks,
};
pub use meta::ExternalNameInitializer;
pub use policy::ManagementAction;
pub use publisher::{ConnectionPublisher, PublishTarget, PublisherChain, SecretPublisher};
pub use reconciler::{ManagedReconciler, ReconcileTiming};
pub use reference::{Extractor, ReferenceError, ReferenceResolver, ResolveReferences, TargetKind};
