//! DBInstance lifecycle tests
//!
//! Drives the DBInstance reconciler against the fake RDS API:
//! - create with an autogenerated master password
//! - restore from a snapshot and the one-time password re-apply, for
//!   instances and clusters
//! - references to a KMS key that appears later
//! - late initialization, idempotence and deletion

mod common;

use aws_resource_controller::constants::{
    CACHE_KEY_PASSWORD, CACHE_KEY_RESTORE_STATE, CONNECTION_KEY_ENDPOINT, CONNECTION_KEY_PASSWORD,
    CONNECTION_KEY_PORT, CONNECTION_KEY_USERNAME, GENERATED_PASSWORD_LENGTH,
};
use aws_resource_controller::crd::rds::{
    DBClusterParameters, DBClusterSpec, DBInstanceParameters, DBInstanceSpec,
    RestoreBackupConfiguration, RestoreSource, SnapshotRestoreConfig,
};
use aws_resource_controller::crd::{
    ConditionStatus, ConditionType, DBCluster, DBInstance, DeletionPolicy, Managed, ManagementPolicy,
    Reference, SecretKeySelector, SecretReference,
};
use aws_resource_controller::kinds::rds::{DBClusterHooks, DBInstanceHooks};
use aws_resource_controller::managed::conditions::{
    REASON_AVAILABLE, REASON_CREATING, REASON_RECONCILE_SUCCESS, REASON_REFERENCE_RESOLUTION_ERROR,
};
use aws_resource_controller::managed::{meta, ReconcilerError, TargetKind};
use aws_resource_controller::provider::rds::DbInstance;
use aws_resource_controller::store::{api_resource, ObjectStore};
use common::*;
use kube::core::DynamicObject;
use serde_json::json;
use std::collections::BTreeMap;

const NAME: &str = "orders-db";
const APP_NAMESPACE: &str = "apps";

fn params() -> DBInstanceParameters {
    DBInstanceParameters {
        region: REGION.to_string(),
        db_instance_class: "db.t3.micro".to_string(),
        engine: "postgres".to_string(),
        master_username: Some("admin".to_string()),
        ..DBInstanceParameters::default()
    }
}

fn password_ref() -> SecretKeySelector {
    SecretKeySelector {
        name: "orders-db-password".to_string(),
        namespace: APP_NAMESPACE.to_string(),
        key: "password".to_string(),
    }
}

fn db_instance(params: DBInstanceParameters) -> DBInstance {
    let mut spec = DBInstanceSpec {
        resource_spec: resource_spec(),
        for_provider: params,
    };
    spec.resource_spec.write_connection_secret_to_ref = Some(SecretReference {
        name: "orders-db-conn".to_string(),
        namespace: APP_NAMESPACE.to_string(),
    });
    DBInstance::new(NAME, spec)
}

fn stored(h: &Harness) -> DBInstance {
    h.objects.get_sync::<DBInstance>(NAME).expect("DBInstance is stored")
}

#[tokio::test]
async fn test_autogenerated_password_is_stored_sent_cached_and_published() {
    let h = Harness::new();
    let mut p = params();
    p.autogenerate_password = true;
    p.master_user_password_secret_ref = Some(password_ref());
    h.objects.insert_typed(&db_instance(p)).unwrap();
    let reconciler = h.reconciler::<DBInstanceHooks>();

    reconciler.reconcile(NAME).await.unwrap();

    let password = h
        .secret_value(APP_NAMESPACE, "orders-db-password", "password")
        .expect("generated password written back to the user's secret");
    assert_eq!(password.chars().count(), GENERATED_PASSWORD_LENGTH);
    assert!(password
        .chars()
        .all(|c| c.is_ascii_graphic() && !matches!(c, '"' | '/' | '@')));
    assert_eq!(
        h.rds().calls(),
        vec![RdsCall::CreateInstance {
            id: NAME.to_string(),
            password: Some(password.clone()),
        }]
    );

    let cr = stored(&h);
    assert_eq!(meta::external_name(&cr), Some(NAME));
    assert!(meta::has_finalizer(&cr));
    assert_eq!(h.cache_value(&cr, CACHE_KEY_PASSWORD).as_deref(), Some(password.as_str()));
    assert_eq!(reason(&cr, ConditionType::Ready).as_deref(), Some(REASON_CREATING));
    assert_eq!(
        h.secret_value(APP_NAMESPACE, "orders-db-conn", CONNECTION_KEY_PASSWORD).as_deref(),
        Some(password.as_str())
    );

    reconciler.reconcile(NAME).await.unwrap();

    let conn = |key: &str| h.secret_value(APP_NAMESPACE, "orders-db-conn", key);
    assert_eq!(conn(CONNECTION_KEY_USERNAME).as_deref(), Some("admin"));
    assert_eq!(conn(CONNECTION_KEY_PASSWORD).as_deref(), Some(password.as_str()));
    assert_eq!(conn(CONNECTION_KEY_ENDPOINT).as_deref(), Some("orders-db.rds.local"));
    assert_eq!(conn(CONNECTION_KEY_PORT).as_deref(), Some("5432"));

    let cr = stored(&h);
    assert_eq!(reason(&cr, ConditionType::Ready).as_deref(), Some(REASON_AVAILABLE));
    assert_eq!(reason(&cr, ConditionType::Synced).as_deref(), Some(REASON_RECONCILE_SUCCESS));
    // the generated password is not regenerated on later reconciles
    assert_eq!(
        h.secret_value(APP_NAMESPACE, "orders-db-password", "password").as_deref(),
        Some(password.as_str())
    );
    assert_eq!(h.rds().calls().len(), 1);
}

#[tokio::test]
async fn test_restored_instance_reapplies_password_once() {
    let h = Harness::new();
    h.secrets.insert(
        APP_NAMESPACE,
        "orders-db-password",
        BTreeMap::from([("password".to_string(), b"s3cret-pass".to_vec())]),
    );
    let mut p = params();
    p.master_user_password_secret_ref = Some(password_ref());
    p.restore_from = Some(RestoreBackupConfiguration {
        source: RestoreSource::Snapshot,
        s3: None,
        snapshot: Some(SnapshotRestoreConfig {
            snapshot_identifier: "orders-snap-1".to_string(),
        }),
        point_in_time: None,
    });
    h.objects.insert_typed(&db_instance(p)).unwrap();
    let reconciler = h.reconciler::<DBInstanceHooks>();

    reconciler.reconcile(NAME).await.unwrap();
    let cr = stored(&h);
    assert_eq!(h.cache_value(&cr, CACHE_KEY_RESTORE_STATE).as_deref(), Some("Restored"));

    // the restored instance keeps the snapshot's password until it is re-applied
    reconciler.reconcile(NAME).await.unwrap();
    let cr = stored(&h);
    assert_eq!(h.cache_value(&cr, CACHE_KEY_RESTORE_STATE).as_deref(), Some("Normal"));
    assert_eq!(h.cache_value(&cr, CACHE_KEY_PASSWORD).as_deref(), Some("s3cret-pass"));

    reconciler.reconcile(NAME).await.unwrap();
    reconciler.reconcile(NAME).await.unwrap();

    assert_eq!(
        h.rds().calls(),
        vec![
            RdsCall::RestoreInstance {
                id: NAME.to_string(),
                password: Some("s3cret-pass".to_string()),
            },
            RdsCall::ModifyInstance {
                id: NAME.to_string(),
                password: Some("s3cret-pass".to_string()),
            },
        ]
    );
}

#[tokio::test]
async fn test_restored_cluster_reapplies_password_once() {
    let h = Harness::new();
    h.secrets.insert(
        APP_NAMESPACE,
        "orders-db-password",
        BTreeMap::from([("password".to_string(), b"s3cret-pass".to_vec())]),
    );
    let cluster = DBCluster::new(
        NAME,
        DBClusterSpec {
            resource_spec: resource_spec(),
            for_provider: DBClusterParameters {
                region: REGION.to_string(),
                engine: "aurora-postgresql".to_string(),
                master_username: Some("admin".to_string()),
                master_user_password_secret_ref: Some(password_ref()),
                restore_from: Some(RestoreBackupConfiguration {
                    source: RestoreSource::Snapshot,
                    s3: None,
                    snapshot: Some(SnapshotRestoreConfig {
                        snapshot_identifier: "orders-cluster-snap-1".to_string(),
                    }),
                    point_in_time: None,
                }),
                ..DBClusterParameters::default()
            },
        },
    );
    h.objects.insert_typed(&cluster).unwrap();
    let reconciler = h.reconciler::<DBClusterHooks>();

    reconciler.reconcile(NAME).await.unwrap();
    let cr = h.objects.get_sync::<DBCluster>(NAME).unwrap();
    assert_eq!(h.cache_value(&cr, CACHE_KEY_RESTORE_STATE).as_deref(), Some("Restored"));
    assert!(h.rds().cluster(NAME).is_some());

    reconciler.reconcile(NAME).await.unwrap();
    let cr = h.objects.get_sync::<DBCluster>(NAME).unwrap();
    assert_eq!(h.cache_value(&cr, CACHE_KEY_RESTORE_STATE).as_deref(), Some("Normal"));
    assert_eq!(h.cache_value(&cr, CACHE_KEY_PASSWORD).as_deref(), Some("s3cret-pass"));

    reconciler.reconcile(NAME).await.unwrap();
    reconciler.reconcile(NAME).await.unwrap();

    assert_eq!(
        h.rds().calls(),
        vec![
            RdsCall::RestoreCluster {
                id: NAME.to_string(),
                password: Some("s3cret-pass".to_string()),
            },
            RdsCall::ModifyCluster {
                id: NAME.to_string(),
                password: Some("s3cret-pass".to_string()),
            },
        ]
    );
    let cr = h.objects.get_sync::<DBCluster>(NAME).unwrap();
    assert_eq!(reason(&cr, ConditionType::Ready).as_deref(), Some(REASON_AVAILABLE));
}

#[tokio::test]
async fn test_password_change_in_user_secret_is_applied() {
    let h = Harness::new();
    let secret = |value: &str| BTreeMap::from([("password".to_string(), value.as_bytes().to_vec())]);
    h.secrets.insert(APP_NAMESPACE, "orders-db-password", secret("first-pass"));
    let mut p = params();
    p.master_user_password_secret_ref = Some(password_ref());
    h.objects.insert_typed(&db_instance(p)).unwrap();
    let reconciler = h.reconciler::<DBInstanceHooks>();

    reconciler.reconcile(NAME).await.unwrap();
    reconciler.reconcile(NAME).await.unwrap();
    assert_eq!(h.rds().calls().len(), 1);

    h.secrets.insert(APP_NAMESPACE, "orders-db-password", secret("second-pass"));
    reconciler.reconcile(NAME).await.unwrap();

    assert_eq!(
        h.rds().calls().last(),
        Some(&RdsCall::ModifyInstance {
            id: NAME.to_string(),
            password: Some("second-pass".to_string()),
        })
    );
    assert_eq!(
        h.cache_value(&stored(&h), CACHE_KEY_PASSWORD).as_deref(),
        Some("second-pass")
    );
    assert_eq!(
        h.secret_value(APP_NAMESPACE, "orders-db-conn", CONNECTION_KEY_PASSWORD).as_deref(),
        Some("second-pass")
    );

    reconciler.reconcile(NAME).await.unwrap();
    assert_eq!(h.rds().calls().len(), 2);
}

#[tokio::test]
async fn test_missing_kms_key_reference_blocks_create_until_it_appears() {
    const KEY_ARN: &str = "arn:aws:kms:us-east-1:123456789012:key/orders";
    let h = Harness::new();
    let mut p = params();
    p.kms_key_id_ref = Some(Reference::new("orders-key"));
    h.objects.insert_typed(&db_instance(p)).unwrap();
    let reconciler = h.reconciler::<DBInstanceHooks>();

    let err = reconciler.reconcile(NAME).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::Reference(_)), "unexpected error: {err}");
    let cr = stored(&h);
    let synced = condition(&cr, ConditionType::Synced).expect("Synced condition");
    assert_eq!(synced.status, ConditionStatus::False);
    assert_eq!(synced.reason, REASON_REFERENCE_RESOLUTION_ERROR);
    assert!(h.rds().calls().is_empty());

    let key_kind = TargetKind::external("kms.aws.octopilot.io", "v1alpha1", "Key", "keys");
    let mut key = DynamicObject::new("orders-key", &key_kind.api_resource);
    key.data = json!({"status": {"atProvider": {"arn": KEY_ARN}}});
    h.objects.insert(&key_kind.api_resource, key);

    reconciler.reconcile(NAME).await.unwrap();

    let cr = stored(&h);
    assert_eq!(cr.for_provider().kms_key_id.as_deref(), Some(KEY_ARN));
    assert_eq!(cr.for_provider().kms_key_id_ref, Some(Reference::new("orders-key")));
    assert_eq!(reason(&cr, ConditionType::Synced).as_deref(), Some(REASON_RECONCILE_SUCCESS));
    assert_eq!(
        h.rds().instance(NAME).and_then(|i| i.kms_key_id).as_deref(),
        Some(KEY_ARN)
    );
}

#[tokio::test]
async fn test_adopted_instance_is_late_initialized_without_overriding_spec() {
    let h = Harness::new();
    h.rds().insert_instance(DbInstance {
        identifier: NAME.to_string(),
        status: Some("available".to_string()),
        arn: Some(FakeRds::instance_arn(NAME)),
        db_instance_class: Some("db.t3.micro".to_string()),
        engine: Some("postgres".to_string()),
        engine_version: Some("14.7".to_string()),
        backup_retention_period: Some(1),
        preferred_backup_window: Some("03:00-04:00".to_string()),
        ..DbInstance::default()
    });
    let mut p = params();
    p.master_username = None;
    p.backup_retention_period = Some(7);
    h.objects.insert_typed(&db_instance(p)).unwrap();
    let reconciler = h.reconciler::<DBInstanceHooks>();

    reconciler.reconcile(NAME).await.unwrap();

    let cr = stored(&h);
    let p = cr.for_provider();
    assert_eq!(p.backup_retention_period, Some(7));
    assert_eq!(p.preferred_backup_window.as_deref(), Some("03:00-04:00"));
    assert_eq!(p.engine_version.as_deref(), Some("14.7"));
    assert_eq!(
        h.rds().calls(),
        vec![RdsCall::ModifyInstance {
            id: NAME.to_string(),
            password: None,
        }]
    );
    assert_eq!(h.rds().instance(NAME).and_then(|i| i.backup_retention_period), Some(7));
}

#[tokio::test]
async fn test_converged_instance_reconciles_without_calls() {
    let h = Harness::new();
    h.objects.insert_typed(&db_instance(params())).unwrap();
    let reconciler = h.reconciler::<DBInstanceHooks>();

    reconciler.reconcile(NAME).await.unwrap();
    reconciler.reconcile(NAME).await.unwrap();
    let before = stored(&h);
    let calls = h.rds().calls();

    for _ in 0..3 {
        reconciler.reconcile(NAME).await.unwrap();
    }

    let after = stored(&h);
    assert_eq!(h.rds().calls(), calls);
    assert_eq!(after.for_provider(), before.for_provider());
    assert_eq!(after.metadata.annotations, before.metadata.annotations);
}

#[tokio::test]
async fn test_delete_removes_instance_then_releases_resource() {
    let h = Harness::new();
    let mut p = params();
    p.autogenerate_password = true;
    p.master_user_password_secret_ref = Some(password_ref());
    h.objects.insert_typed(&db_instance(p)).unwrap();
    let reconciler = h.reconciler::<DBInstanceHooks>();
    reconciler.reconcile(NAME).await.unwrap();
    reconciler.reconcile(NAME).await.unwrap();
    let cr = stored(&h);

    let ar = api_resource::<DBInstance>();
    h.objects.delete(&ar, NAME).await.unwrap();
    reconciler.reconcile(NAME).await.unwrap();

    assert!(h.rds().instance(NAME).is_none());
    assert_eq!(
        h.rds().calls().last(),
        Some(&RdsCall::DeleteInstance { id: NAME.to_string() })
    );
    assert!(h.objects.contains(&ar, NAME));

    reconciler.reconcile(NAME).await.unwrap();

    assert!(!h.objects.contains(&ar, NAME));
    assert_eq!(h.cache_value(&cr, CACHE_KEY_PASSWORD), None);
    assert_eq!(h.secrets.get_sync(APP_NAMESPACE, "orders-db-conn"), None);
}

/// Create an instance with an autogenerated password and return the stored
/// resource once the password is cached
async fn created_with_cached_password(h: &Harness, spec: impl FnOnce(&mut DBInstance)) -> DBInstance {
    let mut p = params();
    p.autogenerate_password = true;
    p.master_user_password_secret_ref = Some(password_ref());
    let mut cr = db_instance(p);
    spec(&mut cr);
    h.objects.insert_typed(&cr).unwrap();
    let reconciler = h.reconciler::<DBInstanceHooks>();
    reconciler.reconcile(NAME).await.unwrap();
    reconciler.reconcile(NAME).await.unwrap();
    let cr = stored(h);
    assert!(h.cache_value(&cr, CACHE_KEY_PASSWORD).is_some());
    cr
}

#[tokio::test]
async fn test_orphaned_instance_is_kept_and_password_cache_dropped() {
    let h = Harness::new();
    let cr = created_with_cached_password(&h, |cr| {
        cr.spec.resource_spec.deletion_policy = DeletionPolicy::Orphan;
    })
    .await;
    let ar = api_resource::<DBInstance>();

    h.objects.delete(&ar, NAME).await.unwrap();
    h.reconciler::<DBInstanceHooks>().reconcile(NAME).await.unwrap();

    assert!(!h.objects.contains(&ar, NAME));
    assert!(h.rds().instance(NAME).is_some());
    assert!(!h
        .rds()
        .calls()
        .iter()
        .any(|c| matches!(c, RdsCall::DeleteInstance { .. })));
    assert_eq!(h.cache_value(&cr, CACHE_KEY_PASSWORD), None);
    assert_eq!(h.secrets.get_sync(APP_NAMESPACE, "orders-db-conn"), None);
}

#[tokio::test]
async fn test_policy_without_delete_keeps_instance_and_drops_password_cache() {
    let h = Harness::new();
    let cr = created_with_cached_password(&h, |cr| {
        cr.spec.resource_spec.management_policy = Some(ManagementPolicy::ObserveCreate);
    })
    .await;
    let ar = api_resource::<DBInstance>();

    h.objects.delete(&ar, NAME).await.unwrap();
    h.reconciler::<DBInstanceHooks>().reconcile(NAME).await.unwrap();

    assert!(!h.objects.contains(&ar, NAME));
    assert!(h.rds().instance(NAME).is_some());
    assert_eq!(h.rds().calls().len(), 1);
    assert_eq!(h.cache_value(&cr, CACHE_KEY_PASSWORD), None);
}

#[tokio::test]
async fn test_instance_deleted_outside_the_controller_still_drops_password_cache() {
    let h = Harness::new();
    let cr = created_with_cached_password(&h, |_| {}).await;
    h.rds().state().instances.remove(NAME);
    let ar = api_resource::<DBInstance>();

    h.objects.delete(&ar, NAME).await.unwrap();
    h.reconciler::<DBInstanceHooks>().reconcile(NAME).await.unwrap();

    assert!(!h.objects.contains(&ar, NAME));
    assert_eq!(h.rds().calls().len(), 1);
    assert_eq!(h.cache_value(&cr, CACHE_KEY_PASSWORD), None);
}

#[tokio::test]
async fn test_deleting_absent_instance_succeeds() {
    let h = Harness::new();
    let mut cr = db_instance(params());
    meta::add_finalizer(&mut cr);
    meta::set_external_name(&mut cr, "never-created");
    h.objects.insert_typed(&cr).unwrap();
    let ar = api_resource::<DBInstance>();
    h.objects.delete(&ar, NAME).await.unwrap();

    let reconciler = h.reconciler::<DBInstanceHooks>();
    reconciler.reconcile(NAME).await.unwrap();

    assert!(!h.objects.contains(&ar, NAME));
    assert!(h.rds().calls().is_empty());
}
