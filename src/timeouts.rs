//! Centralized timeout and shutdown policies.
//!
//! Keeping these values in one place makes it clear which parts of the system
//! share behaviour (HTTP deadlines, graceful shutdown windows, etc.).

use std::time::Duration;

/// Maximum time an admin HTTP request is allowed to wait before dispatch.
pub const ADMIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Socket read/write timeout applied to each accepted admin connection.
pub const ADMIN_STREAM_TIMEOUT: Duration = Duration::from_secs(10);
/// Grace period granted to blocking servers when asked to shut down.
pub const SERVER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
