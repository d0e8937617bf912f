// Worker constants (no magic values)
use std::time::Duration;

/// Default upper bound on one blocking dequeue; also the worst-case delay
/// before an idle worker notices a shutdown request
pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration after a backend error before the next dequeue (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Poll interval for backends without a native blocking pop (100ms)
pub const BACKEND_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Time children get to finish their current job after SIGTERM
pub const DEFAULT_SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// First respawn delay after a worker exits unexpectedly
pub const DEFAULT_RESTART_BASE_DELAY: Duration = Duration::from_secs(1);

/// Respawn delay never grows beyond this
pub const DEFAULT_RESTART_MAX_DELAY: Duration = Duration::from_secs(60);

/// Multiplier applied to the respawn delay per consecutive crash
pub const DEFAULT_RESTART_BACKOFF_FACTOR: f64 = 2.0;

/// A worker that stayed up this long is considered healthy again
pub const DEFAULT_RESTART_STABLE_AFTER: Duration = Duration::from_secs(60);
