//! Compute environment deletion
//!
//! Batch refuses to delete an enabled compute environment. Deletion first
//! disables it, then deletes it once the state is DISABLED, then releases
//! the managed resource when Batch no longer reports it.

mod common;

use aws_resource_controller::crd::batch::{ComputeEnvironmentParameters, ComputeEnvironmentSpec};
use aws_resource_controller::crd::{ComputeEnvironment, ConditionType, Managed, Tag};
use aws_resource_controller::kinds::batch::ComputeEnvironmentHooks;
use aws_resource_controller::managed::conditions::{REASON_AVAILABLE, REASON_DELETING};
use aws_resource_controller::managed::meta;
use aws_resource_controller::provider::batch::ComputeEnvironmentDetail;
use aws_resource_controller::store::{api_resource, ObjectStore};
use common::*;
use std::collections::BTreeMap;

const NAME: &str = "nightly-ce";

fn compute_environment() -> ComputeEnvironment {
    ComputeEnvironment::new(
        NAME,
        ComputeEnvironmentSpec {
            resource_spec: resource_spec(),
            for_provider: ComputeEnvironmentParameters {
                region: REGION.to_string(),
                environment_type: "UNMANAGED".to_string(),
                unmanaged_vcpus: Some(4),
                tags: vec![Tag::new("team", "batch")],
                ..ComputeEnvironmentParameters::default()
            },
        },
    )
}

fn existing_environment() -> ComputeEnvironmentDetail {
    ComputeEnvironmentDetail {
        name: NAME.to_string(),
        arn: Some(FakeBatch::compute_environment_arn(NAME)),
        ecs_cluster_arn: Some(format!("arn:aws:ecs:{REGION}:{ACCOUNT}:cluster/{NAME}")),
        environment_type: Some("UNMANAGED".to_string()),
        state: Some("ENABLED".to_string()),
        status: Some("VALID".to_string()),
        unmanaged_vcpus: Some(4),
        tags: BTreeMap::from([("team".to_string(), "batch".to_string())]),
        ..ComputeEnvironmentDetail::default()
    }
}

#[tokio::test]
async fn test_enabled_environment_is_disabled_deleted_then_released() {
    let h = Harness::new();
    h.batch().insert_compute_environment(existing_environment());
    h.objects.insert_typed(&compute_environment()).unwrap();
    let reconciler = h.reconciler::<ComputeEnvironmentHooks>();
    let ar = api_resource::<ComputeEnvironment>();

    reconciler.reconcile(NAME).await.unwrap();
    let cr = h.objects.get_sync::<ComputeEnvironment>(NAME).unwrap();
    assert_eq!(reason(&cr, ConditionType::Ready).as_deref(), Some(REASON_AVAILABLE));
    assert_eq!(cr.for_provider().desired_state.as_deref(), Some("ENABLED"));
    assert!(h.batch().calls().is_empty(), "adoption needs no writes");

    h.objects.delete(&ar, NAME).await.unwrap();

    reconciler.reconcile(NAME).await.unwrap();
    assert_eq!(
        h.batch().calls(),
        vec![BatchCall::SetComputeEnvironmentState {
            name: NAME.to_string(),
            state: "DISABLED".to_string(),
        }]
    );
    assert!(h.batch().compute_environment(NAME).is_some());
    let cr = h.objects.get_sync::<ComputeEnvironment>(NAME).unwrap();
    assert_eq!(reason(&cr, ConditionType::Ready).as_deref(), Some(REASON_DELETING));

    reconciler.reconcile(NAME).await.unwrap();
    assert_eq!(
        h.batch().calls().last(),
        Some(&BatchCall::DeleteComputeEnvironment { name: NAME.to_string() })
    );
    assert!(h.batch().compute_environment(NAME).is_none());
    assert!(h.objects.contains(&ar, NAME));

    reconciler.reconcile(NAME).await.unwrap();
    assert!(!h.objects.contains(&ar, NAME));
    assert_eq!(h.batch().calls().len(), 2);
}

#[tokio::test]
async fn test_environment_in_transition_is_left_alone_during_delete() {
    let h = Harness::new();
    let mut detail = existing_environment();
    detail.status = Some("UPDATING".to_string());
    h.batch().insert_compute_environment(detail);
    let mut cr = compute_environment();
    meta::add_finalizer(&mut cr);
    meta::set_external_name(&mut cr, NAME);
    h.objects.insert_typed(&cr).unwrap();
    let ar = api_resource::<ComputeEnvironment>();
    h.objects.delete(&ar, NAME).await.unwrap();

    let reconciler = h.reconciler::<ComputeEnvironmentHooks>();
    reconciler.reconcile(NAME).await.unwrap();
    reconciler.reconcile(NAME).await.unwrap();

    assert!(h.batch().calls().is_empty());
    assert!(h.objects.contains(&ar, NAME));
}

#[tokio::test]
async fn test_created_environment_is_observed_up_to_date() {
    let h = Harness::new();
    h.objects.insert_typed(&compute_environment()).unwrap();
    let reconciler = h.reconciler::<ComputeEnvironmentHooks>();

    reconciler.reconcile(NAME).await.unwrap();
    reconciler.reconcile(NAME).await.unwrap();
    reconciler.reconcile(NAME).await.unwrap();

    assert_eq!(
        h.batch().calls(),
        vec![BatchCall::CreateComputeEnvironment { name: NAME.to_string() }]
    );
    let cr = h.objects.get_sync::<ComputeEnvironment>(NAME).unwrap();
    assert_eq!(
        cr.at_provider().and_then(|o| o.compute_environment_arn.clone()),
        Some(FakeBatch::compute_environment_arn(NAME))
    );
}
