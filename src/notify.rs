//! End-of-run chat notifications.

use crate::error::Result;
use reqwest::blocking::Client;
use serde_json::json;
use tracing::debug;
use tracing::warn;
use url::Url;

/// Posts `{"text": message}` to a chat webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: Url) -> Result<Self> {
        Ok(WebhookNotifier {
            client: Client::builder().build()?,
            url,
        })
    }

    #[tracing::instrument(skip(self, message), fields(url = %self.url))]
    pub fn post(&self, message: &str) -> Result<()> {
        self.client
            .post(self.url.clone())
            .json(&json!({ "text": message }))
            .send()?
            .error_for_status()?;
        debug!("Notification delivered");
        Ok(())
    }
}

/// Where run summaries go; chosen once at startup.
#[derive(Debug, Clone, Default)]
pub enum NotificationSink {
    Active(WebhookNotifier),
    #[default]
    Noop,
}

impl NotificationSink {
    /// Delivery problems are logged, never returned.
    pub fn send(&self, message: &str) {
        match self {
            NotificationSink::Active(notifier) => {
                if let Err(error) = notifier.post(message) {
                    warn!("Notification failed: {error}");
                }
            }
            NotificationSink::Noop => debug!("No notification sink configured"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_active_posts_text() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/hooks/crawler")
                .json_body(json!({ "text": "Jobs Complete!" }));
            then.status(200);
        });

        let url = Url::parse(&server.url("/hooks/crawler")).unwrap();
        let sink = NotificationSink::Active(WebhookNotifier::new(url).unwrap());
        sink.send("Jobs Complete!");
        m.assert();
    }

    #[test]
    fn test_failures_are_swallowed() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST).path("/hooks/crawler");
            then.status(500);
        });

        let url = Url::parse(&server.url("/hooks/crawler")).unwrap();
        let notifier = WebhookNotifier::new(url).unwrap();
        assert!(notifier.post("boom").is_err());
        NotificationSink::Active(notifier).send("boom");
        m.assert_hits(2);
    }

    #[test]
    fn test_noop() {
        NotificationSink::default().send("ignored");
    }
}
