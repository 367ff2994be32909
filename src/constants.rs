//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable.

/// Default operator name, written to the `operator` label of every child
pub const DEFAULT_OPERATOR_NAME: &str = "harbor-operator";

/// Operator version written to the `operator/version` pod template annotation
pub const OPERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default maximum number of concurrent reconciles per controller
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 1;

/// Default minimum backoff after a failed reconcile (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default maximum backoff after repeated failed reconciles (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default poll interval while a dependent database is not ready (seconds)
pub const DEFAULT_DATABASE_POLL_INTERVAL_SECS: u64 = 30;

/// Label carrying the operator class of a managed resource
pub const CLASS_LABEL: &str = "containerregistry.ovhcloud.com/class";

/// Pod template annotation holding the checksum of generated configuration
pub const CONFIGURATION_CHECKSUM_ANNOTATION: &str = "configuration/checksum";

/// Pod template annotation holding the checksum of generated secrets
pub const SECRET_CHECKSUM_ANNOTATION: &str = "secret/checksum";

/// Pod template annotation holding the operator version
pub const OPERATOR_VERSION_ANNOTATION: &str = "operator/version";

/// Condition type written after every reconcile pass
pub const APPLIED_CONDITION: &str = "Applied";

/// Condition type written by the database lifecycle controller
pub const DATABASE_READY_CONDITION: &str = "DatabaseReady";

/// Status property exported by the database lifecycle controller
pub const DATABASE_PROPERTY: &str = "database";
