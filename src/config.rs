//! Client configuration for the DynamoDB backend.

use serde::Deserialize;

/// Region used when neither the config nor the environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings.
///
/// Credential sources in order of priority:
/// 1. Hardcoded credentials (`access_key`, `secret_key`, `session_token`)
/// 2. AWS profile from ~/.aws/credentials
/// 3. The default chain (environment variables, instance profile, etc.)
///
/// # Examples
///
/// ```
/// use async_tables::ClientConfig;
///
/// // Local endpoint (localstack, moto, dynamodb-local)
/// let config = ClientConfig::default()
///     .region("eu-west-1")
///     .endpoint_url("http://localhost:8000");
/// assert_eq!(config.region.as_deref(), Some("eu-west-1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
}

impl ClientConfig {
    /// Read region, profile and endpoint from the standard AWS variables.
    ///
    /// Credentials are left to the default chain.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            region: non_empty("AWS_REGION").or_else(|| non_empty("AWS_DEFAULT_REGION")),
            profile: non_empty("AWS_PROFILE"),
            endpoint_url: non_empty("AWS_ENDPOINT_URL"),
            ..Self::default()
        }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self.session_token = session_token;
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    /// The configured region, or [`DEFAULT_REGION`].
    pub fn effective_region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }
}
