//! Reference targets served by sibling controllers.

use crate::managed::TargetKind;

pub fn kms_key() -> TargetKind {
    TargetKind::external("kms.aws.octopilot.io", "v1alpha1", "Key", "keys")
}

pub fn db_subnet_group() -> TargetKind {
    TargetKind::external("rds.aws.octopilot.io", "v1alpha1", "DBSubnetGroup", "dbsubnetgroups")
}

pub fn security_group() -> TargetKind {
    TargetKind::external("ec2.aws.octopilot.io", "v1alpha1", "SecurityGroup", "securitygroups")
}

pub fn subnet() -> TargetKind {
    TargetKind::external("ec2.aws.octopilot.io", "v1alpha1", "Subnet", "subnets")
}

pub fn iam_role() -> TargetKind {
    TargetKind::external("iam.aws.octopilot.io", "v1alpha1", "Role", "roles")
}

pub fn lambda_function() -> TargetKind {
    TargetKind::external("lambda.aws.octopilot.io", "v1alpha1", "Function", "functions")
}
