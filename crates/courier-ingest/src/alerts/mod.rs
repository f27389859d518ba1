//! Failure alerting
//!
//! Alerts carry a title and structured facts. Channels that only take a single
//! message (OpsGenie) render the facts into the description. Delivery
//! failures are logged and never propagate into the ingestion run.

pub mod opsgenie;
pub mod teams;

use async_trait::async_trait;
use courier_common::{CourierError, Result};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AlertConfig;

pub use opsgenie::OpsGenieNotifier;
pub use teams::TeamsNotifier;

/// One name/value pair shown with an alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fact {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub facts: Vec<Fact>,
}

impl Alert {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            facts: Vec::new(),
        }
    }

    pub fn fact(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.facts.push(Fact {
            name: name.into(),
            value: value.to_string(),
        });
        self
    }

    /// Facts as `name: value` lines
    pub fn description(&self) -> String {
        self.facts
            .iter()
            .map(|f| format!("{}: {}", f.name, f.value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &'static str;

    async fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Fans an alert out to every configured channel
#[derive(Clone, Default)]
pub struct AlertDispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl AlertDispatcher {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    /// Build the channels enabled in `config`; empty when none are
    pub fn from_config(config: &AlertConfig) -> Result<Self> {
        if !config.is_enabled() {
            return Ok(Self::default());
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CourierError::config(format!("Failed to build alert HTTP client: {}", e)))?;

        let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();
        if let Some(url) = &config.teams_webhook_url {
            notifiers.push(Arc::new(TeamsNotifier::new(client.clone(), url.clone())));
        }
        if !config.opsgenie_api_keys.is_empty() {
            let mut opsgenie =
                OpsGenieNotifier::new(client.clone(), config.opsgenie_api_keys.clone());
            if let Some(url) = &config.opsgenie_url {
                opsgenie = opsgenie.with_url(url.clone());
            }
            notifiers.push(Arc::new(opsgenie));
        }

        info!(channels = notifiers.len(), "Failure alerting enabled");
        Ok(Self { notifiers })
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Deliver to every channel; returns how many succeeded
    pub async fn dispatch(&self, alert: &Alert) -> usize {
        let mut delivered = 0;
        for notifier in &self.notifiers {
            match notifier.notify(alert).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    channel = notifier.channel(),
                    title = %alert.title,
                    error = %e,
                    "Failed to deliver alert"
                ),
            }
        }
        delivered
    }
}

pub(crate) fn delivery_error(channel: &str, err: impl std::fmt::Display) -> CourierError {
    CourierError::Alert(format!("{}: {}", channel, err))
}
