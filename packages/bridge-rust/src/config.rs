use std::time::Duration;

/// Bridge-level configuration for call dispatch.
///
/// The defaults reproduce the source behavior: unbounded fire-and-forget
/// dispatch with no deadline. Both knobs exist because the absence of
/// backpressure and cancellation is a known gap, not a design goal.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Maximum number of handler bodies executing at once. `None` leaves
    /// in-flight calls unbounded.
    pub max_in_flight: Option<usize>,
    /// How long the dispatcher waits for a handler before recording a
    /// `DeadlineExceeded` outcome. The handler itself is not interrupted.
    pub call_timeout: Option<Duration>,
    /// Number of recent call outcomes retained by the unmatched-reply trail.
    pub reply_log_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_in_flight: None,
            call_timeout: None,
            reply_log_capacity: 128,
        }
    }
}
