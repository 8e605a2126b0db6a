//! Host lifecycle hooks.
//!
//! Mobile hosts suspend apps shortly after they leave the foreground unless
//! the app asks for continued execution. [`BackgroundExecution`] lets the
//! connection manager make that request without depending on a platform API.

use std::time::Duration;

/// Host hook for continued execution while backgrounded.
///
/// # Example
///
/// ```ignore
/// struct IosBackgroundTask { /* UIApplication handle */ }
///
/// impl BackgroundExecution for IosBackgroundTask {
///     fn begin(&self) -> Option<Duration> {
///         // beginBackgroundTask + backgroundTimeRemaining
///     }
///     fn end(&self) { /* endBackgroundTask */ }
/// }
/// ```
pub trait BackgroundExecution: Send + Sync {
    /// Requests continued execution time.
    ///
    /// Returns the time the host granted, or `None` when the host does not
    /// say (the configured default grace period is used instead).
    fn begin(&self) -> Option<Duration>;

    /// Releases the continued-execution request.
    fn end(&self);
}

/// Hook for hosts without background restrictions (desktop, headless).
pub struct NoopBackgroundExecution;

impl BackgroundExecution for NoopBackgroundExecution {
    fn begin(&self) -> Option<Duration> {
        log::debug!("[Lifecycle] Background execution requested (no-op)");
        None
    }

    fn end(&self) {
        log::debug!("[Lifecycle] Background execution released (no-op)");
    }
}

/// Hook granting a fixed amount of time, for hosts that know their budget.
pub struct FixedBackgroundExecution(pub Duration);

impl BackgroundExecution for FixedBackgroundExecution {
    fn begin(&self) -> Option<Duration> {
        Some(self.0)
    }

    fn end(&self) {}
}
