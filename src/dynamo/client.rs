//! DynamoDB SDK client construction.

use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::{Credentials, Region};
use tracing::debug;

use crate::config::{ClientConfig, DEFAULT_REGION};
use crate::errors::{Error, Result};

/// Build the AWS SDK DynamoDB client with the given configuration.
///
/// Region priority: config > default provider chain > `us-east-1`.
/// Credentials priority: hardcoded > profile > default chain.
pub async fn build_client(config: &ClientConfig) -> Result<Client> {
    if config.access_key.is_some() != config.secret_key.is_some() {
        return Err(Error::Config(
            "access_key and secret_key must be set together".to_string(),
        ));
    }

    let region_provider = RegionProviderChain::first_try(config.region.clone().map(Region::new))
        .or_default_provider()
        .or_else(DEFAULT_REGION);

    let mut config_loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

    if let (Some(ak), Some(sk)) = (&config.access_key, &config.secret_key) {
        debug!("Using hardcoded credentials");
        let creds = Credentials::new(
            ak.clone(),
            sk.clone(),
            config.session_token.clone(),
            None,
            "async-tables-hardcoded",
        );
        config_loader = config_loader.credentials_provider(creds);
    } else if let Some(profile_name) = &config.profile {
        debug!(profile = %profile_name, "Using profile credentials");
        let profile_provider = ProfileFileCredentialsProvider::builder()
            .profile_name(profile_name)
            .build();
        config_loader = config_loader.credentials_provider(profile_provider);
    }

    let sdk_config = config_loader.load().await;

    let mut dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
    if let Some(url) = &config.endpoint_url {
        debug!(endpoint = %url, "Using custom endpoint");
        dynamo_config = dynamo_config.endpoint_url(url);
    }

    Ok(Client::from_conf(dynamo_config.build()))
}
