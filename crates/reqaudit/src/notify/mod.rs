//! Notification service clients
//!
//! [`NotificationPublisher`] is the seam between the notification emitter and
//! the pub/sub service. [`SnsPublisher`] is the AWS SNS implementation.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_sns::{config::Region, error::DisplayErrorContext, Client};
use tracing::{debug, instrument};

use crate::error::PublishError;

pub mod config;

use self::config::CREDENTIALS_PROVIDER_NAME;
pub use self::config::SnsConfig;

/// Acknowledgement returned by the notification service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: Option<String>,
}

/// Publishes one message to one topic
#[async_trait]
pub trait NotificationPublisher: Send + Sync + std::fmt::Debug {
    async fn publish(&self, topic: &str, message: String) -> Result<PublishReceipt, PublishError>;
}

/// AWS SNS publisher
#[derive(Clone)]
pub struct SnsPublisher {
    client: Client,
    region: String,
}

impl SnsPublisher {
    /// Build a client with explicit static credentials.
    ///
    /// Does no I/O; returns `None` when the config carries no credentials.
    pub fn with_static_credentials(config: &SnsConfig) -> Option<Self> {
        let (access_key_id, secret_access_key) = config.static_credentials()?;

        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            CREDENTIALS_PROVIDER_NAME,
        );

        let mut sns_config_builder = aws_sdk_sns::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint {
            sns_config_builder = sns_config_builder.endpoint_url(endpoint);
        }

        Some(Self {
            client: Client::from_conf(sns_config_builder.build()),
            region: config.region.clone(),
        })
    }

    /// Build a client from the default AWS credential chain
    pub async fn from_environment(config: &SnsConfig) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut sns_config_builder = aws_sdk_sns::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            sns_config_builder = sns_config_builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(sns_config_builder.build()),
            region: config.region.clone(),
        }
    }

    /// Static credentials when configured, the default chain otherwise
    pub async fn new(config: &SnsConfig) -> Self {
        if let Some(publisher) = Self::with_static_credentials(config) {
            debug!(
                access_key_id = config.access_key_id.as_deref().unwrap_or_default(),
                "SNS publisher configured with explicit credentials"
            );
            return publisher;
        }

        debug!("SNS publisher configured without explicit credentials");
        Self::from_environment(config).await
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

impl std::fmt::Debug for SnsPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnsPublisher").field("region", &self.region).finish_non_exhaustive()
    }
}

#[async_trait]
impl NotificationPublisher for SnsPublisher {
    #[instrument(skip(self, message), fields(message_len = message.len()))]
    async fn publish(&self, topic: &str, message: String) -> Result<PublishReceipt, PublishError> {
        debug!("Publishing SNS notification");

        let output = self
            .client
            .publish()
            .topic_arn(topic)
            .message(message)
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(service_err) => PublishError::Rejected(service_err.to_string()),
                None => PublishError::Transport(DisplayErrorContext(&err).to_string()),
            })?;

        Ok(PublishReceipt {
            message_id: output.message_id().map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_publisher_requires_credentials() {
        let config = SnsConfig::new("us-west-1", "arn:aws:sns:us-west-1:000000000000:audit");
        assert!(SnsPublisher::with_static_credentials(&config).is_none());

        let config = config.with_credentials("abcdef", "123456");
        let publisher = SnsPublisher::with_static_credentials(&config).unwrap();
        assert_eq!(publisher.region(), "us-west-1");
    }

    #[test]
    fn test_debug_omits_client() {
        let config = SnsConfig::new("eu-central-1", "arn:aws:sns:eu-central-1:000000000000:audit")
            .with_credentials("abcdef", "123456");
        let publisher = SnsPublisher::with_static_credentials(&config).unwrap();

        let debug = format!("{:?}", publisher);
        assert!(debug.contains("eu-central-1"));
        assert!(!debug.contains("123456"));
    }
}
