use serde::{Deserialize, Serialize};
use std::env;

/// S3-compatible object storage connection settings
///
/// The bucket is chosen per call (the destination container), so only the
/// endpoint and credentials live here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    /// Static credentials; when absent the AWS default provider chain is used
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl StorageConfig {
    /// Default connection from `S3_*` variables, falling back to `AWS_*`
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_env_profile(None)
    }

    /// Connection for a named store, read from `S3_<NAME>_*` variables
    ///
    /// `None` selects the default connection. Named stores never read `AWS_*`.
    pub fn from_env_profile(profile: Option<&str>) -> anyhow::Result<Self> {
        Self::from_lookup(profile, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(profile: Option<&str>, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = match profile {
            Some(name) => {
                let name = name.trim();
                if name.is_empty()
                    || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    anyhow::bail!("invalid storage profile name: {:?}", name);
                }
                format!("S3_{}_", name.to_ascii_uppercase())
            },
            None => "S3_".to_string(),
        };
        let var = |suffix: &str, aws_fallback: Option<&str>| {
            lookup(&format!("{}{}", prefix, suffix))
                .or_else(|| match (profile, aws_fallback) {
                    (None, Some(key)) => lookup(key),
                    _ => None,
                })
                .filter(|v| !v.is_empty())
        };

        let config = Self {
            endpoint: var("ENDPOINT", None),
            region: var("REGION", Some("AWS_REGION")).unwrap_or_else(|| "us-east-1".to_string()),
            access_key: var("ACCESS_KEY", Some("AWS_ACCESS_KEY_ID")),
            secret_key: var("SECRET_KEY", Some("AWS_SECRET_ACCESS_KEY")),
            path_style: var("PATH_STYLE", None)
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        };

        if config.access_key.is_some() != config.secret_key.is_some() {
            anyhow::bail!("{}ACCESS_KEY and {}SECRET_KEY must be set together", prefix, prefix);
        }

        Ok(config)
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }
}
