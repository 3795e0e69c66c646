//! # CRD Generator
//!
//! Generates the CustomResourceDefinition YAML of every kind the controller
//! serves, plus `ProviderConfig`, as one multi-document stream.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/aws-resources.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use aws_resource_controller::crd::{
    Backup, ComputeEnvironment, DBCluster, DBClusterParameterGroup, DBInstance, DBParameterGroup,
    GlobalTable, Job, JobDefinition, JobQueue, Permission, ProviderConfig, Table,
};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::CustomResourceExt;

fn crds() -> Vec<CustomResourceDefinition> {
    vec![
        ProviderConfig::crd(),
        DBInstance::crd(),
        DBCluster::crd(),
        DBParameterGroup::crd(),
        DBClusterParameterGroup::crd(),
        ComputeEnvironment::crd(),
        JobQueue::crd(),
        JobDefinition::crd(),
        Job::crd(),
        Table::crd(),
        Backup::crd(),
        GlobalTable::crd(),
        Permission::crd(),
    ]
}

fn main() {
    println!("# This file is auto-generated by crdgen");
    println!("# DO NOT EDIT THIS FILE MANUALLY");
    println!("# Fix schema issues in the Rust types under src/crd/");
    println!("#");

    for crd in crds() {
        match serde_yaml::to_string(&crd) {
            Ok(yaml) => {
                println!("---");
                print!("{yaml}");
            }
            Err(e) => {
                eprintln!(
                    "Failed to serialize CRD {} to YAML: {e}",
                    crd.metadata.name.unwrap_or_default()
                );
                std::process::exit(1);
            }
        }
    }
}
