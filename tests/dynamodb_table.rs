//! DynamoDB table and backup reconciliation

mod common;

use aws_resource_controller::crd::dynamodb::{
    AttributeDefinition, BackupParameters, BackupSpec, KeySchemaElement, ProvisionedThroughput,
    TableParameters, TableSpec,
};
use aws_resource_controller::crd::{Backup, ConditionType, Managed, Reference, Table};
use aws_resource_controller::kinds::dynamodb::{BackupHooks, TableHooks};
use aws_resource_controller::managed::conditions::{REASON_AVAILABLE, REASON_CREATING};
use aws_resource_controller::managed::{meta, ReconcilerError};
use aws_resource_controller::provider::dynamodb::TableUpdate;
use common::*;

const NAME: &str = "orders";
const BACKUP: &str = "orders-before-migration";

fn table() -> Table {
    Table::new(
        NAME,
        TableSpec {
            resource_spec: resource_spec(),
            for_provider: TableParameters {
                region: REGION.to_string(),
                attribute_definitions: vec![AttributeDefinition {
                    attribute_name: "pk".to_string(),
                    attribute_type: "S".to_string(),
                }],
                key_schema: vec![KeySchemaElement {
                    attribute_name: "pk".to_string(),
                    key_type: "HASH".to_string(),
                }],
                provisioned_throughput: Some(ProvisionedThroughput {
                    read_capacity_units: 5,
                    write_capacity_units: 5,
                }),
                ..TableParameters::default()
            },
        },
    )
}

#[tokio::test]
async fn test_table_becomes_available_then_switches_billing_mode() {
    let h = Harness::new();
    h.objects.insert_typed(&table()).unwrap();
    let reconciler = h.reconciler::<TableHooks>();

    reconciler.reconcile(NAME).await.unwrap();
    reconciler.reconcile(NAME).await.unwrap();
    let cr = h.objects.get_sync::<Table>(NAME).unwrap();
    assert_eq!(reason(&cr, ConditionType::Ready).as_deref(), Some(REASON_CREATING));
    assert_eq!(cr.for_provider().billing_mode.as_deref(), Some("PROVISIONED"));

    h.dynamodb().set_table_status(NAME, "ACTIVE");
    reconciler.reconcile(NAME).await.unwrap();
    let cr = h.objects.get_sync::<Table>(NAME).unwrap();
    assert_eq!(reason(&cr, ConditionType::Ready).as_deref(), Some(REASON_AVAILABLE));
    assert_eq!(
        h.dynamodb().calls(),
        vec![DynamoDbCall::CreateTable { name: NAME.to_string() }]
    );

    h.objects
        .edit::<Table>(NAME, |cr| {
            cr.spec.for_provider.billing_mode = Some("PAY_PER_REQUEST".to_string());
        })
        .unwrap();
    reconciler.reconcile(NAME).await.unwrap();
    assert_eq!(
        h.dynamodb().calls().last(),
        Some(&DynamoDbCall::UpdateTable {
            name: NAME.to_string(),
            update: TableUpdate {
                billing_mode: Some("PAY_PER_REQUEST".to_string()),
                ..TableUpdate::default()
            },
        })
    );

    reconciler.reconcile(NAME).await.unwrap();
    assert_eq!(h.dynamodb().calls().len(), 2);
}

#[tokio::test]
async fn test_table_without_key_schema_is_not_created() {
    let h = Harness::new();
    let mut cr = table();
    cr.spec.for_provider.key_schema.clear();
    h.objects.insert_typed(&cr).unwrap();
    let reconciler = h.reconciler::<TableHooks>();

    // validation failures are not retried with backoff
    reconciler.reconcile(NAME).await.unwrap();

    assert!(h.dynamodb().calls().is_empty());
    let cr = h.objects.get_sync::<Table>(NAME).unwrap();
    let synced = condition(&cr, ConditionType::Synced).unwrap();
    assert!(synced.message.unwrap_or_default().contains("keySchema"));
}

fn backup_of(table: &str) -> Backup {
    Backup::new(
        BACKUP,
        BackupSpec {
            resource_spec: resource_spec(),
            for_provider: BackupParameters {
                region: REGION.to_string(),
                table_name_ref: Some(Reference::new(table)),
                ..BackupParameters::default()
            },
        },
    )
}

#[tokio::test]
async fn test_backup_resolves_table_name_from_table_reference() {
    let h = Harness::new();
    let mut cr = table();
    meta::set_external_name(&mut cr, "orders-prod");
    h.objects.insert_typed(&cr).unwrap();
    h.reconciler::<TableHooks>().reconcile(NAME).await.unwrap();
    assert!(h.dynamodb().table("orders-prod").is_some());

    h.objects.insert_typed(&backup_of(NAME)).unwrap();
    let reconciler = h.reconciler::<BackupHooks>();
    reconciler.reconcile(BACKUP).await.unwrap();

    let cr = h.objects.get_sync::<Backup>(BACKUP).unwrap();
    assert_eq!(cr.for_provider().table_name.as_deref(), Some("orders-prod"));
    assert_eq!(
        h.dynamodb().calls().last(),
        Some(&DynamoDbCall::CreateBackup {
            table: "orders-prod".to_string(),
            name: BACKUP.to_string(),
        })
    );
    let arn = format!("arn:aws:dynamodb:{REGION}:{ACCOUNT}:table/orders-prod/backup/{BACKUP}");
    assert_eq!(meta::external_name(&cr), Some(arn.as_str()));

    reconciler.reconcile(BACKUP).await.unwrap();
    let cr = h.objects.get_sync::<Backup>(BACKUP).unwrap();
    assert_eq!(reason(&cr, ConditionType::Ready).as_deref(), Some(REASON_AVAILABLE));
    assert_eq!(h.dynamodb().calls().len(), 2);
}

#[tokio::test]
async fn test_backup_waits_for_referenced_table() {
    let h = Harness::new();
    h.objects.insert_typed(&backup_of("missing")).unwrap();
    let reconciler = h.reconciler::<BackupHooks>();

    let err = reconciler.reconcile(BACKUP).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::Reference(_)));
    assert!(h.dynamodb().calls().is_empty());
    let cr = h.objects.get_sync::<Backup>(BACKUP).unwrap();
    assert_eq!(cr.for_provider().table_name, None);
}
