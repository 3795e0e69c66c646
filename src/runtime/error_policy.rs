//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loops.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::backoff::BackoffRegistry;
use crate::crd::Managed;
use crate::managed::ReconcilerError;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};

/// Backoff key of a managed resource
pub fn backoff_key<R: Managed>(obj: &R) -> String {
    format!("{}/{}", R::kind_name(), obj.resource_name())
}

/// Requeue a resource whose reconcile returned a retryable error
///
/// Backoff is tracked per resource, so many failing resources do not
/// delay each other.
pub fn handle_reconciliation_error<R: Managed>(
    obj: &R,
    error: &ReconcilerError,
    backoff: &BackoffRegistry,
) -> Action {
    let key = backoff_key(obj);
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = %R::kind_name(),
        resource.name = obj.resource_name(),
        error = %error
    );
    let _error_guard = error_span.enter();

    let (delay, attempts) = backoff.next_backoff(&key);
    error!("Reconciliation error for {}: {}", key, error);
    info!(
        "Retrying {} in {}s (error count: {})",
        key,
        delay.as_secs(),
        attempts
    );
    Action::requeue(delay)
}

/// How a watch stream error is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401: RBAC revoked or token expired
    Unauthorized,
    /// 410: resource version expired
    Expired,
    /// 429: API server storage reinitializing
    TooManyRequests,
    /// 404: CRD missing or object deleted
    NotFound,
    Other,
}

impl WatchErrorKind {
    pub fn classify(error: &str) -> Self {
        // 404 first: a plain-text 404 body surfaces as a serde error inside WatchFailed
        let is_not_found =
            error.contains("ObjectNotFound") || error.contains("404") || error.contains("not found");
        if (error.contains("401") || error.contains("Unauthorized")) && !is_not_found {
            WatchErrorKind::Unauthorized
        } else if error.contains("410")
            || error.contains("too old resource version")
            || error.contains("Expired")
            || error.contains("Gone")
        {
            WatchErrorKind::Expired
        } else if error.contains("429")
            || error.contains("storage is (re)initializing")
            || error.contains("TooManyRequests")
        {
            WatchErrorKind::TooManyRequests
        } else if is_not_found {
            WatchErrorKind::NotFound
        } else {
            WatchErrorKind::Other
        }
    }
}

/// Handle a watch stream error
///
/// Returns `None` to drop the event and let the stream restart, or `Some(())`
/// to continue.
pub async fn handle_watch_stream_error(
    kind: &str,
    error_string: &str,
    backoff_ms: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        resource.kind = kind,
        error = %error_string
    );
    handle_classified(kind, error_string, backoff_ms, max_backoff_ms, restart_delay)
        .instrument(error_span)
        .await
}

async fn handle_classified(
    kind: &str,
    error_string: &str,
    backoff_ms: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    restart_delay: Duration,
) -> Option<()> {
    match WatchErrorKind::classify(error_string) {
        WatchErrorKind::Unauthorized => {
            error!(
                "Watch of {} failed with 401 Unauthorized; check the controller's ClusterRole grants list/watch on this kind",
                kind
            );
            warn!("Waiting {}s before retrying watch", restart_delay.as_secs());
            tokio::time::sleep(restart_delay).await;
            None
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version of {} expired (410), watch will restart", kind);
            None
        }
        WatchErrorKind::TooManyRequests => {
            let current = backoff_ms.load(Ordering::Relaxed);
            warn!(
                "API server storage reinitializing (429), backing off {}ms before restarting the {} watch",
                current, kind
            );
            tokio::time::sleep(Duration::from_millis(current)).await;
            backoff_ms.store(current.saturating_mul(2).min(max_backoff_ms), Ordering::Relaxed);
            None
        }
        WatchErrorKind::NotFound => {
            warn!(
                "{} not found (404); normal when an object was just deleted. Error: {}",
                kind, error_string
            );
            Some(())
        }
        WatchErrorKind::Other => {
            error!("Controller stream error for {}: {}", kind, error_string);
            tokio::time::sleep(restart_delay).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_watch_errors() {
        assert_eq!(
            WatchErrorKind::classify("WatchFailed: 401 Unauthorized"),
            WatchErrorKind::Unauthorized
        );
        assert_eq!(
            WatchErrorKind::classify("too old resource version: 123 (456)"),
            WatchErrorKind::Expired
        );
        assert_eq!(
            WatchErrorKind::classify("storage is (re)initializing"),
            WatchErrorKind::TooManyRequests
        );
        assert_eq!(
            WatchErrorKind::classify("WatchFailed: invalid type: integer `404`"),
            WatchErrorKind::NotFound
        );
        assert_eq!(WatchErrorKind::classify("connection reset"), WatchErrorKind::Other);
    }

    #[tokio::test]
    async fn test_not_found_continues_stream() {
        let backoff = Arc::new(AtomicU64::new(100));
        let result =
            handle_watch_stream_error("Table", "ObjectNotFound", &backoff, 1_000, Duration::ZERO).await;
        assert_eq!(result, Some(()));
    }

    #[tokio::test]
    async fn test_too_many_requests_doubles_backoff() {
        let backoff = Arc::new(AtomicU64::new(1));
        let result = handle_watch_stream_error("Table", "429 TooManyRequests", &backoff, 3, Duration::ZERO).await;
        assert_eq!(result, None);
        assert_eq!(backoff.load(Ordering::Relaxed), 2);
        handle_watch_stream_error("Table", "429", &backoff, 3, Duration::ZERO).await;
        assert_eq!(backoff.load(Ordering::Relaxed), 3);
    }
}
