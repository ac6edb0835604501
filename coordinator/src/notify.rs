use async_trait::async_trait;
use futures::future::join_all;
use macaw_domain::Alert;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Default alert history retention.
pub const MAX_ALERT_HISTORY: usize = 1000;

/// One delivery channel.
///
/// A channel reports whether it is configured; unconfigured channels are
/// skipped. Delivery failures are logged by the notifier, never
/// propagated.
#[async_trait]
pub trait AlertChannel: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn is_configured(&self) -> bool;
    async fn send(&self, alert: &Alert) -> bool;
}

/// Discord webhook channel, configured iff a webhook URL is present.
#[derive(Debug)]
pub struct DiscordChannel {
    webhook_url: Option<Url>,
    client: reqwest::Client,
}

impl DiscordChannel {
    pub fn new(webhook_url: Option<Url>) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AlertChannel for DiscordChannel {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn send(&self, alert: &Alert) -> bool {
        let Some(url) = &self.webhook_url else {
            return false;
        };
        let content = format!(
            "**{:?}** `{}`{}{}",
            alert.severity,
            alert.kind,
            alert
                .service
                .as_ref()
                .map(|service| format!(" [{service}]"))
                .unwrap_or_default(),
            alert
                .message
                .as_ref()
                .map(|message| format!(": {message}"))
                .unwrap_or_default(),
        );
        match self
            .client
            .post(url.clone())
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Slack webhook channel, configured iff a webhook URL is present.
#[derive(Debug)]
pub struct SlackChannel {
    webhook_url: Option<Url>,
    client: reqwest::Client,
}

impl SlackChannel {
    pub fn new(webhook_url: Option<Url>) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AlertChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn send(&self, alert: &Alert) -> bool {
        let Some(url) = &self.webhook_url else {
            return false;
        };
        let text = format!(
            "[{:?}] {} {}",
            alert.severity,
            alert.kind,
            alert.message.as_deref().unwrap_or_default()
        );
        match self
            .client
            .post(url.clone())
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Multi-channel alert fan-out with a bounded history ring.
///
/// `notify` records the alert in history, then delivers to every
/// configured channel in parallel; one slow or failing channel never
/// blocks the others or the caller's error path.
pub struct AlertNotifier {
    channels: Vec<Arc<dyn AlertChannel>>,
    history: Mutex<VecDeque<Alert>>,
    max_history: usize,
}

impl fmt::Debug for AlertNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.channels.iter().map(|channel| channel.name()).collect();
        f.debug_struct("AlertNotifier")
            .field("channels", &names)
            .finish_non_exhaustive()
    }
}

impl AlertNotifier {
    pub fn new(channels: Vec<Arc<dyn AlertChannel>>) -> Self {
        Self {
            channels,
            history: Mutex::new(VecDeque::new()),
            max_history: MAX_ALERT_HISTORY,
        }
    }

    #[cfg(test)]
    fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Records the alert and fans it out to all configured channels.
    pub async fn notify(&self, alert: Alert) {
        {
            let mut history = self.history.lock();
            if history.len() == self.max_history {
                history.pop_front();
            }
            history.push_back(alert.clone());
        }

        let configured: Vec<&Arc<dyn AlertChannel>> = self
            .channels
            .iter()
            .filter(|channel| channel.is_configured())
            .collect();
        if configured.is_empty() {
            warn!(kind = %alert.kind, "no alert channel configured, alert only recorded");
            return;
        }

        let deliveries = configured.iter().map(|channel| {
            let channel = Arc::clone(channel);
            let alert = alert.clone();
            async move {
                let delivered = channel.send(&alert).await;
                if delivered {
                    debug!(channel = channel.name(), kind = %alert.kind, "alert delivered");
                } else {
                    warn!(channel = channel.name(), kind = %alert.kind, "alert delivery failed");
                }
            }
        });
        join_all(deliveries).await;
    }

    /// The most recent `limit` alerts, newest first.
    pub fn history(&self, limit: usize) -> Vec<Alert> {
        let history = self.history.lock();
        history.iter().rev().take(limit).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use macaw_domain::AlertSeverity;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingChannel {
        configured: bool,
        succeed: bool,
        sent: AtomicUsize,
    }

    impl RecordingChannel {
        fn new(configured: bool, succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                configured,
                succeed,
                sent: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AlertChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            "recording"
        }
        fn is_configured(&self) -> bool {
            self.configured
        }
        async fn send(&self, _alert: &Alert) -> bool {
            self.sent.fetch_add(1, Ordering::SeqCst);
            self.succeed
        }
    }

    fn alert(kind: &str, at_ms: i64) -> Alert {
        Alert::new(
            kind,
            AlertSeverity::High,
            Utc.timestamp_millis_opt(1_700_000_000_000 + at_ms).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_fan_out_skips_unconfigured_channels() {
        let configured = RecordingChannel::new(true, true);
        let unconfigured = RecordingChannel::new(false, true);
        let notifier = AlertNotifier::new(vec![configured.clone(), unconfigured.clone()]);

        notifier.notify(alert("A", 0)).await;
        assert_eq!(configured.sent.load(Ordering::SeqCst), 1);
        assert_eq!(unconfigured.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_channel_failure_does_not_propagate() {
        let failing = RecordingChannel::new(true, false);
        let healthy = RecordingChannel::new(true, true);
        let notifier = AlertNotifier::new(vec![failing.clone(), healthy.clone()]);

        notifier.notify(alert("A", 0)).await;
        assert_eq!(failing.sent.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.sent.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.history_len(), 1);
    }

    #[tokio::test]
    async fn test_no_channels_still_records_history() {
        let notifier = AlertNotifier::new(vec![]);
        notifier.notify(alert("A", 0)).await;
        assert_eq!(notifier.history_len(), 1);
    }

    #[tokio::test]
    async fn test_history_ring_drops_oldest() {
        let notifier = AlertNotifier::new(vec![]).with_max_history(3);
        for i in 0..5 {
            notifier.notify(alert(&format!("A{i}"), i)).await;
        }
        let history = notifier.history(10);
        let kinds: Vec<&str> = history.iter().map(|alert| alert.kind.as_str()).collect();
        assert_eq!(kinds, vec!["A4", "A3", "A2"]);
    }

    #[tokio::test]
    async fn test_history_newest_first_with_limit() {
        let notifier = AlertNotifier::new(vec![]);
        for i in 0..10 {
            notifier.notify(alert(&format!("A{i}"), i)).await;
        }
        let history = notifier.history(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, "A9");
        assert_eq!(history[1].kind, "A8");
    }

    #[test]
    fn test_discord_channel_configured_by_webhook_presence() {
        assert!(!DiscordChannel::new(None).is_configured());
        let url = Url::parse("https://discord.com/api/webhooks/1/abc").unwrap();
        assert!(DiscordChannel::new(Some(url)).is_configured());
    }
}
