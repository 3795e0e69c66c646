use crate::managed::conditions::{REASON_RECONCILE_ERROR, REASON_REFERENCE_RESOLUTION_ERROR};
use crate::managed::external::ExternalError;
use crate::managed::reference::ReferenceError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by a managed-resource reconcile
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("cannot resolve references: {0}")]
    Reference(#[from] ReferenceError),

    #[error("cannot connect to AWS: {0}")]
    Connect(#[source] ExternalError),

    #[error("cannot observe external resource: {0}")]
    Observe(#[source] ExternalError),

    #[error("cannot create external resource: {0}")]
    Create(#[source] ExternalError),

    #[error("cannot update external resource: {0}")]
    Update(#[source] ExternalError),

    #[error("cannot delete external resource: {0}")]
    Delete(#[source] ExternalError),

    #[error("cannot publish connection details: {0}")]
    Publish(#[source] ExternalError),

    #[error("cannot update managed resource: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReconcilerError {
    /// Reason recorded on the `Synced` condition
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::Reference(_) => REASON_REFERENCE_RESOLUTION_ERROR,
            _ => REASON_RECONCILE_ERROR,
        }
    }

    /// Label for the reconciliation error metric
    pub fn metric_reason(&self) -> &'static str {
        match self {
            ReconcilerError::Reference(_) => "reference",
            ReconcilerError::Connect(_) => "connect",
            ReconcilerError::Observe(_) => "observe",
            ReconcilerError::Create(_) => "create",
            ReconcilerError::Update(_) => "update",
            ReconcilerError::Delete(_) => "delete",
            ReconcilerError::Publish(_) => "publish",
            ReconcilerError::Store(_) => "store",
            ReconcilerError::Validation(_) => "validation",
            ReconcilerError::Serialization(_) => "serialization",
        }
    }

    /// Retryable errors are returned to the controller runtime and requeued
    /// with backoff; the rest wait for the next poll or a spec change
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcilerError::Reference(_) | ReconcilerError::Store(_) => true,
            ReconcilerError::Connect(e)
            | ReconcilerError::Observe(e)
            | ReconcilerError::Create(e)
            | ReconcilerError::Update(e)
            | ReconcilerError::Delete(e)
            | ReconcilerError::Publish(e) => e.is_retryable(),
            ReconcilerError::Validation(_) | ReconcilerError::Serialization(_) => false,
        }
    }
}
