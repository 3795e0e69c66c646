//! AWS error classification
//!
//! SDK errors are classified by their `.code()` into the categories the
//! reconciler cares about: absent, duplicate, transient, invalid input,
//! fatal. Every service client maps its errors through [`from_sdk_error`].

use aws_sdk_rds::config::http::HttpResponse;
use aws_sdk_rds::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AwsError {
    /// The resource does not exist
    #[error("resource not found: {message}")]
    NotFound { message: String },

    /// A resource with that identifier already exists
    #[error("resource already exists: {message}")]
    AlreadyExists { message: String },

    /// Rate limit exceeded (retryable with backoff)
    #[error("rate limit exceeded: {message}")]
    Throttled { message: String },

    /// 5xx, timeouts and dispatch failures (retryable)
    #[error("AWS service unavailable: {message}")]
    ServerError { message: String },

    /// Resource has dependent objects (retryable, e.g. a compute
    /// environment still attached to a job queue)
    #[error("resource has dependent objects: {message}")]
    DependencyViolation { message: String },

    /// The resource is busy (modifying, still in use)
    #[error("resource is in an incompatible state: {message}")]
    InvalidState { message: String },

    /// The request was rejected as invalid; retrying will not help
    #[error("invalid request: {message}")]
    InvalidParameter { message: String },

    /// Credentials are missing, expired or lack permission
    #[error("access denied: {message}")]
    AccessDenied { message: String },

    /// Unclassified AWS SDK error
    #[error("AWS error{}: {message}", code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Sdk { code: Option<String>, message: String },
}

impl AwsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, AwsError::AlreadyExists { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AwsError::Throttled { .. }
                | AwsError::ServerError { .. }
                | AwsError::DependencyViolation { .. }
                | AwsError::InvalidState { .. }
                | AwsError::Sdk { .. }
        )
    }

    /// Errors that cannot be fixed by retrying without a spec change
    pub fn is_validation(&self) -> bool {
        matches!(self, AwsError::InvalidParameter { .. })
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AwsError::NotFound {
            message: message.into(),
        }
    }

    /// Short label used in metrics
    pub fn category(&self) -> &'static str {
        match self {
            AwsError::NotFound { .. } => "not_found",
            AwsError::AlreadyExists { .. } => "already_exists",
            AwsError::Throttled { .. } => "throttled",
            AwsError::ServerError { .. } => "server_error",
            AwsError::DependencyViolation { .. } => "dependency_violation",
            AwsError::InvalidState { .. } => "invalid_state",
            AwsError::InvalidParameter { .. } => "invalid_parameter",
            AwsError::AccessDenied { .. } => "access_denied",
            AwsError::Sdk { .. } => "sdk",
        }
    }
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "DBInstanceNotFound",
    "DBInstanceNotFoundFault",
    "DBClusterNotFoundFault",
    "DBParameterGroupNotFound",
    "DBParameterGroupNotFoundFault",
    "DBClusterParameterGroupNotFound",
    "DBClusterParameterGroupNotFoundFault",
    "DBSnapshotNotFound",
    "ResourceNotFoundException",
    "ResourceNotFoundFault",
    "TableNotFoundException",
    "BackupNotFoundException",
    "GlobalTableNotFoundException",
    "ResourceNotFound",
];

/// Known AWS error codes for "already exists" conditions
const ALREADY_EXISTS_CODES: &[&str] = &[
    "DBInstanceAlreadyExists",
    "DBInstanceAlreadyExistsFault",
    "DBClusterAlreadyExistsFault",
    "DBParameterGroupAlreadyExists",
    "DBParameterGroupAlreadyExistsFault",
    "TableAlreadyExistsException",
    "GlobalTableAlreadyExistsException",
    "ResourceConflictException",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "LimitExceededException",
];

/// Known AWS error codes for server-side failures
const SERVER_CODES: &[&str] = &[
    "InternalFailure",
    "InternalServerError",
    "InternalServerErrorException",
    "ServiceUnavailable",
    "ServiceException",
    "ServerException",
];

/// Known AWS error codes for dependency violations (resource still in use)
const DEPENDENCY_CODES: &[&str] = &["DependencyViolation", "InvalidDBClusterParameterGroupState"];

/// Known AWS error codes for resources that are busy
const INVALID_STATE_CODES: &[&str] = &[
    "InvalidDBInstanceState",
    "InvalidDBInstanceStateFault",
    "InvalidDBClusterStateFault",
    "InvalidDBParameterGroupState",
    "InvalidDBParameterGroupStateFault",
    "ResourceInUseException",
    "ResourceInUse",
    "PreconditionFailedException",
];

/// Known AWS error codes for rejected input
const INVALID_PARAMETER_CODES: &[&str] = &[
    "InvalidParameterValue",
    "InvalidParameterCombination",
    "InvalidParameterValueException",
    "InvalidParameterException",
    "InvalidRequestException",
    "MissingParameter",
    "ValidationException",
    "ClientException",
];

/// Known AWS error codes for authentication and authorization failures
const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "UnrecognizedClientException",
    "InvalidClientTokenId",
    "ExpiredTokenException",
    "SignatureDoesNotMatch",
];

/// Classify an AWS error from its code, message and HTTP status.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>, status: Option<u16>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        // DynamoDB reports a duplicate CreateTable with the same code as a busy table
        Some("ResourceInUseException") if message.contains("already exists") => {
            AwsError::AlreadyExists { message }
        }
        // Batch reports missing resources as a generic client error
        Some("ClientException") if message.contains("does not exist") => {
            AwsError::NotFound { message }
        }
        Some("ClientException") if message.contains("relationship") => {
            AwsError::DependencyViolation { message }
        }
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound { message },
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => AwsError::AlreadyExists { message },
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled { message },
        Some(c) if SERVER_CODES.contains(&c) => AwsError::ServerError { message },
        Some(c) if DEPENDENCY_CODES.contains(&c) => AwsError::DependencyViolation { message },
        Some(c) if INVALID_STATE_CODES.contains(&c) => AwsError::InvalidState { message },
        Some(c) if INVALID_PARAMETER_CODES.contains(&c) => AwsError::InvalidParameter { message },
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => AwsError::AccessDenied { message },
        _ if status.is_some_and(|s| s >= 500) => AwsError::ServerError { message },
        _ if status == Some(404) => AwsError::NotFound { message },
        _ => AwsError::Sdk {
            code: code.map(ToString::to_string),
            message,
        },
    }
}

/// Classify an SDK error from any of the service clients.
pub fn from_sdk_error<E>(err: &SdkError<E, HttpResponse>) -> AwsError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            AwsError::ServerError {
                message: DisplayErrorContext(err).to_string(),
            }
        }
        _ => {
            let meta = ProvideErrorMetadata::meta(err);
            let status = err.raw_response().map(|r| r.status().as_u16());
            let fallback = DisplayErrorContext(err).to_string();
            classify_aws_error(meta.code(), meta.message().or(Some(fallback.as_str())), status)
        }
    }
}
