//! OpsGenie alert API channel

use async_trait::async_trait;
use courier_common::Result;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{delivery_error, Alert, Notifier};

pub const DEFAULT_OPSGENIE_URL: &str = "https://api.opsgenie.com/v2/alerts";

/// OpsGenie truncates longer messages
const MAX_MESSAGE_LEN: usize = 130;

#[derive(Debug, Serialize)]
struct CreateAlert<'a> {
    message: String,
    description: &'a str,
}

/// Posts one alert per configured API key
pub struct OpsGenieNotifier {
    client: Client,
    api_keys: Vec<String>,
    url: String,
}

impl OpsGenieNotifier {
    pub fn new(client: Client, api_keys: Vec<String>) -> Self {
        Self {
            client,
            api_keys,
            url: DEFAULT_OPSGENIE_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

fn truncate(message: &str) -> String {
    message.chars().take(MAX_MESSAGE_LEN).collect()
}

#[async_trait]
impl Notifier for OpsGenieNotifier {
    fn channel(&self) -> &'static str {
        "opsgenie"
    }

    async fn notify(&self, alert: &Alert) -> Result<()> {
        let description = alert.description();
        let body = CreateAlert {
            message: truncate(&alert.title),
            description: &description,
        };

        let mut first_error = None;
        for key in &self.api_keys {
            let sent = self
                .client
                .post(&self.url)
                .header("Authorization", format!("GenieKey {}", key))
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            if let Err(e) = sent {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(delivery_error(self.channel(), e)),
            None => {
                debug!(title = %alert.title, keys = self.api_keys.len(), "Sent OpsGenie alert");
                Ok(())
            },
        }
    }
}
