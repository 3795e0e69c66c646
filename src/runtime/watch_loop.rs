//! # Watch Loop
//!
//! One `kube_runtime::Controller` per managed kind. Each loop restarts its
//! watch stream after errors and exits once shutdown begins.

use crate::controller::backoff::BackoffRegistry;
use crate::crd::Managed;
use crate::kinds::{reconciler_for, timing, BuildHooks, KindContext};
use crate::managed::{ManagedReconciler, ReconcilerError, ResolveReferences};
use crate::runtime::error_policy::{backoff_key, handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube_runtime::{controller, controller::Action, watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

struct LoopContext<R: Managed + ResolveReferences> {
    reconciler: ManagedReconciler<R>,
    backoff: BackoffRegistry,
}

/// Run the watch loop of the kind handled by `H` until shutdown
pub async fn run<H>(ctx: Arc<KindContext>) -> anyhow::Result<()>
where
    H: BuildHooks,
    H::Resource: ResolveReferences,
{
    let kind = <H::Resource as Managed>::kind_name();
    let api: Api<H::Resource> = Api::all(ctx.client.clone());
    check_queryable(&api, &kind).await;

    let loop_ctx = Arc::new(LoopContext {
        reconciler: reconciler_for::<H>(
            Arc::clone(&ctx.objects),
            Arc::clone(&ctx.publisher),
            Arc::clone(&ctx.connect),
            timing(&ctx.config),
        ),
        backoff: BackoffRegistry::new(
            ctx.config.backoff_start_duration(),
            ctx.config.backoff_max_duration(),
        ),
    });

    let start_ms = ctx.config.backoff_start_secs.saturating_mul(1_000);
    let max_ms = ctx.config.backoff_max_secs.saturating_mul(1_000);
    let stream_backoff = Arc::new(AtomicU64::new(start_ms));

    loop {
        if ctx.server_state.is_shutting_down() {
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            resource.kind = %kind
        );
        info!("Starting {} watch", kind);

        let backoff = Arc::clone(&stream_backoff);
        let restart_delay = ctx.config.watch_restart_delay_duration();
        let filter_kind = kind.clone();
        Controller::new(api.clone(), watcher::Config::default().any_semantic())
            .with_config(controller::Config::default().concurrency(ctx.config.max_concurrent_reconciles))
            .shutdown_on_signal()
            .run(
                reconcile::<H::Resource>,
                error_policy::<H::Resource>,
                Arc::clone(&loop_ctx),
            )
            .filter_map(move |event| {
                let backoff = Arc::clone(&backoff);
                let kind = filter_kind.clone();
                async move {
                    let error_string = match &event {
                        Ok(_) => None,
                        Err(e) => Some(format!("{e:?}")),
                    };
                    let Some(error_string) = error_string else {
                        backoff.store(start_ms, Ordering::Relaxed);
                        debug!("watch.event.success");
                        return Some(event);
                    };
                    handle_watch_stream_error(&kind, &error_string, &backoff, max_ms, restart_delay)
                        .await
                        .map(|()| event)
                }
            })
            .for_each(|_| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if ctx.server_state.is_shutting_down() {
            break;
        }

        let delay = ctx.config.watch_restart_delay_after_end_duration();
        warn!(
            "{} watch stream ended, restarting in {} seconds...",
            kind,
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("{} watch stopped", kind);
    Ok(())
}

async fn reconcile<R>(obj: Arc<R>, ctx: Arc<LoopContext<R>>) -> Result<Action, ReconcilerError>
where
    R: Managed + ResolveReferences,
{
    let result = ctx.reconciler.reconcile(obj.resource_name()).await;
    match &result {
        Ok(action) => {
            ctx.backoff.reset(&backoff_key(obj.as_ref()));
            debug!(resource.name = obj.resource_name(), action = ?action, "watch.event.reconciled");
        }
        Err(e) => {
            debug!(resource.name = obj.resource_name(), error = %e, "watch.event.reconciliation_failed");
        }
    }
    result
}

fn error_policy<R>(obj: Arc<R>, error: &ReconcilerError, ctx: Arc<LoopContext<R>>) -> Action
where
    R: Managed + ResolveReferences,
{
    handle_reconciliation_error(obj.as_ref(), error, &ctx.backoff)
}

/// Log whether the kind's CRD is installed; the watch is started either way
async fn check_queryable<R: Managed>(api: &Api<R>, kind: &str) {
    match api.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("{} CRD is queryable", kind),
        Err(e) => {
            warn!(
                "{} CRD is not queryable: {}. Is the CRD installed? Generate it with `crdgen | kubectl apply -f -`",
                kind, e
            );
        }
    }
}
