//! # Lambda Resource Policy Documents
//!
//! Lambda has no API to read a single permission. The function's whole
//! policy is fetched and the statement whose `Sid` equals the external name
//! is picked out of it.
//!
//! ```json
//! { "Version": "2012-10-17", "Statement": [
//!   { "Sid": "...", "Effect": "Allow", "Action": "lambda:InvokeFunction",
//!     "Resource": "arn:aws:lambda:...",
//!     "Principal": {"Service": "s3.amazonaws.com"},
//!     "Condition": {"ArnLike": {"AWS:SourceArn": "arn:aws:s3:::bucket"}} } ] }
//! ```

use crate::managed::ExternalError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const CONDITION_ARN_LIKE: &str = "ArnLike";
pub const CONDITION_STRING_EQUALS: &str = "StringEquals";
pub const KEY_SOURCE_ARN: &str = "AWS:SourceArn";
pub const KEY_SOURCE_ACCOUNT: &str = "AWS:SourceAccount";
pub const KEY_PRINCIPAL_ORG_ID: &str = "aws:PrincipalOrgID";
pub const KEY_EVENT_SOURCE_TOKEN: &str = "lambda:EventSourceToken";

#[derive(Debug, Deserialize)]
struct PolicyDocument {
    #[serde(rename = "Statement", default)]
    statement: Vec<Value>,
}

/// Who a statement grants access to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPrincipal", into = "RawPrincipal")]
pub enum Principal {
    Service(String),
    Aws(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawPrincipal {
    Bare(String),
    Map(BTreeMap<String, String>),
}

impl TryFrom<RawPrincipal> for Principal {
    type Error = String;

    fn try_from(raw: RawPrincipal) -> Result<Self, Self::Error> {
        match raw {
            RawPrincipal::Bare(service) => Ok(Principal::Service(service)),
            RawPrincipal::Map(mut map) => {
                if map.len() != 1 {
                    return Err(format!(
                        "principal must have exactly one of Service or AWS, got {} keys",
                        map.len()
                    ));
                }
                if let Some(service) = map.remove("Service") {
                    Ok(Principal::Service(service))
                } else if let Some(aws) = map.remove("AWS") {
                    Ok(Principal::Aws(aws))
                } else {
                    Err(format!(
                        "unsupported principal type {:?}",
                        map.keys().next().map(String::as_str).unwrap_or_default()
                    ))
                }
            }
        }
    }
}

impl From<Principal> for RawPrincipal {
    fn from(p: Principal) -> Self {
        let (key, value) = match p {
            Principal::Service(s) => ("Service", s),
            Principal::Aws(a) => ("AWS", a),
        };
        RawPrincipal::Map(BTreeMap::from([(key.to_string(), value)]))
    }
}

impl Principal {
    /// The principal `AddPermission` stores for a requested principal
    ///
    /// A bare account ID is stored as the account root ARN; an ARN stays as
    /// is; anything else is a service principal.
    #[must_use]
    pub fn from_requested(principal: &str) -> Self {
        if is_account_id(principal) {
            Principal::Aws(format!("arn:aws:iam::{principal}:root"))
        } else if principal.starts_with("arn:") {
            Principal::Aws(principal.to_string())
        } else {
            Principal::Service(principal.to_string())
        }
    }
}

fn is_account_id(s: &str) -> bool {
    s.len() == 12 && s.bytes().all(|b| b.is_ascii_digit())
}

/// One statement of a function policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyStatement {
    #[serde(rename = "Sid")]
    pub sid: String,
    #[serde(rename = "Effect", default)]
    pub effect: Option<String>,
    #[serde(rename = "Action", default)]
    pub action: Option<String>,
    #[serde(rename = "Resource", default)]
    pub resource: Option<String>,
    #[serde(rename = "Principal", default)]
    pub principal: Option<Principal>,
    #[serde(rename = "Condition", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<BTreeMap<String, BTreeMap<String, Value>>>,
}

impl PolicyStatement {
    /// `Condition[operator][key]` as a string; missing levels yield `None`
    #[must_use]
    pub fn condition_value(&self, operator: &str, key: &str) -> Option<&str> {
        self.condition
            .as_ref()
            .and_then(|c| c.get(operator))
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
    }

    pub fn source_arn(&self) -> Option<&str> {
        self.condition_value(CONDITION_ARN_LIKE, KEY_SOURCE_ARN)
    }

    pub fn source_account(&self) -> Option<&str> {
        self.condition_value(CONDITION_STRING_EQUALS, KEY_SOURCE_ACCOUNT)
    }

    pub fn principal_org_id(&self) -> Option<&str> {
        self.condition_value(CONDITION_STRING_EQUALS, KEY_PRINCIPAL_ORG_ID)
    }

    pub fn event_source_token(&self) -> Option<&str> {
        self.condition_value(CONDITION_STRING_EQUALS, KEY_EVENT_SOURCE_TOKEN)
    }
}

/// The statement with `Sid == sid` in `policy`, if any
///
/// Only the matching statement is decoded, so unrelated statements with
/// shapes this parser does not understand do not fail the lookup.
pub fn find_statement(policy: &str, sid: &str) -> Result<Option<PolicyStatement>, ExternalError> {
    let document: PolicyDocument = serde_json::from_str(policy)
        .map_err(|e| ExternalError::Policy(format!("invalid policy document: {e}")))?;
    let Some(raw) = document
        .statement
        .into_iter()
        .find(|s| s.get("Sid").and_then(Value::as_str) == Some(sid))
    else {
        return Ok(None);
    };
    serde_json::from_value(raw)
        .map(Some)
        .map_err(|e| ExternalError::Policy(format!("invalid statement {sid}: {e}")))
}
