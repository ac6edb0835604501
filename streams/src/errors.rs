use chrono::{DateTime, Utc};
use macaw_domain::{Alert, AlertSeverity};
use serde_json::json;

/// Consecutive consumer errors tolerated on one stream before a burst
/// alert fires.
pub const MAX_STREAM_ERRORS: u32 = 10;

/// Consecutive-error counter for one stream consumer.
///
/// A burst of `MAX_STREAM_ERRORS` read failures raises exactly one
/// `STREAM_CONSUMER_FAILURE` alert; the armed flag resets on the next
/// successful read so a persistent outage does not spam the notifier.
#[derive(Debug)]
pub struct StreamErrorTracker {
    stream: String,
    consecutive: u32,
    alerted: bool,
}

impl StreamErrorTracker {
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            consecutive: 0,
            alerted: false,
        }
    }

    /// Records a failed read; returns the burst alert when the threshold
    /// is first reached.
    pub fn record_error(&mut self, now: DateTime<Utc>) -> Option<Alert> {
        self.consecutive += 1;
        if self.consecutive >= MAX_STREAM_ERRORS && !self.alerted {
            self.alerted = true;
            return Some(
                Alert::new("STREAM_CONSUMER_FAILURE", AlertSeverity::Critical, now)
                    .with_message(format!(
                        "{} consecutive consumer errors on {}",
                        self.consecutive, self.stream
                    ))
                    .with_data(json!({
                        "streamName": self.stream,
                        "errorCount": self.consecutive,
                    })),
            );
        }
        None
    }

    /// Records a successful read, ending the burst.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
        self.alerted = false;
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_alert_fires_once_at_threshold() {
        let mut tracker = StreamErrorTracker::new("stream:health");
        for _ in 0..MAX_STREAM_ERRORS - 1 {
            assert!(tracker.record_error(now()).is_none());
        }

        let alert = tracker.record_error(now()).expect("alert at threshold");
        assert_eq!(alert.kind, "STREAM_CONSUMER_FAILURE");
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.data["streamName"], "stream:health");
        assert_eq!(alert.data["errorCount"], 10);

        // Burst continues without re-alerting.
        assert!(tracker.record_error(now()).is_none());
        assert!(tracker.record_error(now()).is_none());
    }

    #[test]
    fn test_success_rearms_the_burst_alert() {
        let mut tracker = StreamErrorTracker::new("stream:health");
        for _ in 0..MAX_STREAM_ERRORS {
            tracker.record_error(now());
        }
        tracker.record_success();
        assert_eq!(tracker.consecutive_errors(), 0);

        for _ in 0..MAX_STREAM_ERRORS - 1 {
            assert!(tracker.record_error(now()).is_none());
        }
        assert!(tracker.record_error(now()).is_some());
    }
}
