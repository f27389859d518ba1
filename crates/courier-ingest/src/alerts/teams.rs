//! Microsoft Teams incoming-webhook channel (legacy `MessageCard` format)

use async_trait::async_trait;
use courier_common::Result;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{delivery_error, Alert, Fact, Notifier};

const THEME_COLOR: &str = "5BE0CA";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCard<'a> {
    #[serde(rename = "@type")]
    card_type: &'static str,
    #[serde(rename = "@context")]
    context: &'static str,
    theme_color: &'static str,
    summary: &'a str,
    title: &'a str,
    sections: Vec<Section<'a>>,
}

#[derive(Debug, Serialize)]
struct Section<'a> {
    facts: &'a [Fact],
}

impl<'a> MessageCard<'a> {
    pub fn from_alert(alert: &'a Alert) -> Self {
        Self {
            card_type: "MessageCard",
            context: "https://schema.org/extensions",
            theme_color: THEME_COLOR,
            summary: &alert.title,
            title: &alert.title,
            sections: vec![Section { facts: &alert.facts }],
        }
    }
}

pub struct TeamsNotifier {
    client: Client,
    webhook_url: String,
}

impl TeamsNotifier {
    pub fn new(client: Client, webhook_url: String) -> Self {
        Self {
            client,
            webhook_url,
        }
    }
}

#[async_trait]
impl Notifier for TeamsNotifier {
    fn channel(&self) -> &'static str {
        "teams"
    }

    async fn notify(&self, alert: &Alert) -> Result<()> {
        self.client
            .post(&self.webhook_url)
            .json(&MessageCard::from_alert(alert))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| delivery_error(self.channel(), e))?;

        debug!(title = %alert.title, "Sent Teams alert");
        Ok(())
    }
}
