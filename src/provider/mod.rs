//! # AWS Service Clients
//!
//! One narrow trait per AWS service (`RdsApi`, `BatchApi`, `DynamoDbApi`,
//! `LambdaApi`) covering exactly the calls the kind adapters make, with an
//! SDK-backed implementation of each. Adapters never touch SDK types.
//!
//! ## Module Structure
//!
//! - `error.rs` - [`AwsError`] and SDK error classification
//! - `factory.rs` - builds service clients from a `ProviderConfig`
//! - `rds/`, `batch/`, `dynamodb/`, `lambda/` - service traits and SDK clients
//! - `secrets_manager.rs` - optional mirror of connection details

pub mod batch;
pub mod dynamodb;
mod error;
pub mod factory;
pub mod lambda;
pub mod rds;
pub mod secrets_manager;

pub use error::{classify_aws_error, from_sdk_error, AwsError};
pub use factory::{SdkServiceFactory, ServiceFactory};

use crate::observability::metrics;
use aws_sdk_rds::config::http::HttpResponse;
use aws_sdk_rds::error::{ProvideErrorMetadata, SdkError};
use std::future::Future;
use std::time::Instant;
use tracing::debug;

/// Await an SDK call, recording call count, latency and classified errors
pub(crate) async fn timed<T, E, F>(
    service: &'static str,
    operation: &'static str,
    call: F,
) -> Result<T, AwsError>
where
    F: Future<Output = Result<T, SdkError<E, HttpResponse>>>,
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let start = Instant::now();
    let result = call.await;
    metrics::record_aws_call(service, operation, start.elapsed().as_secs_f64());

    result.map_err(|e| {
        let err = from_sdk_error(&e);
        metrics::increment_aws_errors(service, err.category());
        debug!(service, operation, error = %err, "AWS call failed");
        err
    })
}

/// Map a builder validation failure onto the invalid-parameter category
pub(crate) fn invalid(err: impl std::fmt::Display) -> AwsError {
    AwsError::InvalidParameter {
        message: err.to_string(),
    }
}
