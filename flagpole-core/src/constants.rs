//! Protocol constants for flagpole.

use std::time::Duration;

/// Default refresh interval applied until the server dictates its own TTL.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(900);

/// Resource path of the feature-flag endpoint. The caller's product version
/// is appended as the final path segment.
pub const FLAG_RESOURCE_PATH: &str = "/api/2.0/connector-service/feature-flags/OSS_JDBC";

/// How long a shutdown waits for an in-flight refresh cycle before the
/// poller task is aborted.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default per-request timeout for the HTTP flag source, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
