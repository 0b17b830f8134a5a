use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::ChannelError;

/// Snapshot of the socket's lifecycle as seen by the client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionState {
    /// True between a successful open and the next error or close.
    pub is_open: bool,
    pub error: bool,
    /// Last recorded failure, kept for diagnostics.
    pub error_object: Option<ChannelError>,
    pub last_received_at: Option<DateTime<Utc>>,
    pub last_ping_at: Option<DateTime<Utc>>,
}

impl ConnectionState {
    pub fn error_message(&self) -> Option<String> {
        self.error_object.as_ref().map(|e| e.to_string())
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub interval: Duration,
    pub penalty_factor: f64,
    /// A failure this long after the previous one restarts the backoff.
    pub reset_after: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            penalty_factor: 1.5,
            reset_after: Duration::from_secs(60 * 60),
        }
    }
}

impl ReconnectPolicy {
    /// `penalty_factor ^ attempts × interval`, rounded to the millisecond.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
        let millis = self.penalty_factor.powi(exponent) * self.interval.as_millis() as f64;
        if !millis.is_finite() || millis >= u64::MAX as f64 {
            return Duration::from_millis(u64::MAX);
        }
        Duration::from_millis(millis.max(0.0).round() as u64)
    }
}

/// Bookkeeping for the reconnect loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconnectState {
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub retrying: bool,
}

impl ReconnectState {
    /// Count one more failed connection and return how long to wait.
    ///
    /// The quiet-period check compares against the previous attempt, so the
    /// counter only resets when a failure happens long after the last one.
    pub fn register_failure(&mut self, now: DateTime<Utc>, policy: &ReconnectPolicy) -> Duration {
        if let Some(last) = self.last_attempt_at {
            let quiet = now
                .signed_duration_since(last)
                .to_std()
                .is_ok_and(|elapsed| elapsed > policy.reset_after);
            if quiet {
                self.attempts = 0;
            }
        }
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt_at = Some(now);
        self.retrying = true;
        policy.delay_for(self.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn default_backoff_grows_by_half() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(15_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(22_500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(33_750));
    }

    #[test]
    fn consecutive_failures_increment_attempts() {
        let policy = ReconnectPolicy::default();
        let mut state = ReconnectState::default();
        assert_eq!(state.register_failure(at(0), &policy), Duration::from_millis(15_000));
        assert_eq!(state.register_failure(at(20), &policy), Duration::from_millis(22_500));
        assert_eq!(state.register_failure(at(50), &policy), Duration::from_millis(33_750));
        assert_eq!(state.attempts, 3);
        assert!(state.retrying);
        assert_eq!(state.last_attempt_at, Some(at(50)));
    }

    #[test]
    fn failure_after_an_hour_restarts_backoff() {
        let policy = ReconnectPolicy::default();
        let mut state = ReconnectState {
            attempts: 6,
            last_attempt_at: Some(at(0)),
            retrying: true,
        };
        let delay = state.register_failure(at(3601), &policy);
        assert_eq!(state.attempts, 1);
        assert_eq!(delay, Duration::from_millis(15_000));
    }

    #[test]
    fn failure_within_the_hour_keeps_growing() {
        let policy = ReconnectPolicy::default();
        let mut state = ReconnectState {
            attempts: 2,
            last_attempt_at: Some(at(0)),
            retrying: true,
        };
        state.register_failure(at(3600), &policy);
        assert_eq!(state.attempts, 3);
    }

    #[test]
    fn huge_attempt_counts_saturate() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn error_message_renders_error_object() {
        let state = ConnectionState {
            error: true,
            error_object: Some(ChannelError::AbnormalClose(4000)),
            ..Default::default()
        };
        assert_eq!(
            state.error_message().as_deref(),
            Some("WebSocket channel error 4000")
        );
    }
}
