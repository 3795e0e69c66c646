//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Requeue interval after a successful reconcile (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Requeue interval while a resource is creating or deleting (seconds)
pub const DEFAULT_SHORT_WAIT_SECS: u64 = 30;

/// Default exponential backoff starting value (seconds)
pub const DEFAULT_BACKOFF_START_SECS: u64 = 1;

/// Default exponential backoff maximum value (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default number of concurrent reconciles per kind
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 10;

/// Namespace holding controller-owned secrets (password caches)
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "aws-resource-system";

/// Window after a recorded successful Create during which a missing
/// resource is attributed to eventual consistency (seconds)
pub const DEFAULT_CREATE_GRACE_PERIOD_SECS: u64 = 60;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// ProviderConfig used when a resource does not name one
pub const DEFAULT_PROVIDER_CONFIG_NAME: &str = "default";

/// Prefix for secrets mirrored into AWS Secrets Manager
pub const DEFAULT_SECRETS_MANAGER_PREFIX: &str = "aws-resource-controller";

/// Finalizer attached to every managed resource
pub const FINALIZER: &str = "finalizer.managedresource.aws.octopilot.io";

/// Field manager used for spec and status writes
pub const FIELD_MANAGER: &str = "aws-resource-controller";

/// Annotation carrying the AWS identifier of a managed resource
pub const ANNOTATION_EXTERNAL_NAME: &str = "aws.octopilot.io/external-name";

/// Set (RFC 3339) immediately before a Create call
pub const ANNOTATION_EXTERNAL_CREATE_PENDING: &str = "aws.octopilot.io/external-create-pending";

/// Set (RFC 3339) when a Create call returned success
pub const ANNOTATION_EXTERNAL_CREATE_SUCCEEDED: &str = "aws.octopilot.io/external-create-succeeded";

/// Set (RFC 3339) when a Create call returned an error
pub const ANNOTATION_EXTERNAL_CREATE_FAILED: &str = "aws.octopilot.io/external-create-failed";

/// Well-known connection detail keys
pub const CONNECTION_KEY_ENDPOINT: &str = "endpoint";
pub const CONNECTION_KEY_PORT: &str = "port";
pub const CONNECTION_KEY_USERNAME: &str = "username";
pub const CONNECTION_KEY_PASSWORD: &str = "password";

/// Password cache secret keys
pub const CACHE_KEY_PASSWORD: &str = "cachedPassword";
pub const CACHE_KEY_RESTORE_STATE: &str = "restoreState";

/// Length of generated master passwords
pub const GENERATED_PASSWORD_LENGTH: usize = 20;

/// RDS accepts at most this many parameters per Modify/Reset call
pub const MAX_PARAMETERS_PER_REQUEST: usize = 20;
