use serde::{Deserialize, Serialize};

/// Provider name attached to explicit static credentials
pub const CREDENTIALS_PROVIDER_NAME: &str = "reqaudit-sns";

/// Settings for the SNS notification publisher
#[derive(Clone, Serialize, Deserialize)]
pub struct SnsConfig {
    pub region: String,
    pub topic_arn: String,
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub secret_access_key: Option<String>,
    /// Custom endpoint, e.g. a LocalStack URL
    pub endpoint: Option<String>,
}

impl SnsConfig {
    pub fn new(region: impl Into<String>, topic_arn: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            topic_arn: topic_arn.into(),
            access_key_id: None,
            secret_access_key: None,
            endpoint: None,
        }
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Static credentials, only when both halves are present
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(key), Some(secret)) => Some((key.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

impl std::fmt::Debug for SnsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnsConfig")
            .field("region", &self.region)
            .field("topic_arn", &self.topic_arn)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "**********"))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_credentials_require_both_halves() {
        let config = SnsConfig::new("us-west-1", "arn:aws:sns:us-west-1:000000000000:audit");
        assert!(config.static_credentials().is_none());

        let mut partial = config.clone();
        partial.access_key_id = Some("abcdef".to_string());
        assert!(partial.static_credentials().is_none());

        let full = config.with_credentials("abcdef", "123456");
        assert_eq!(full.static_credentials(), Some(("abcdef", "123456")));
    }

    #[test]
    fn test_debug_masks_secret() {
        let config = SnsConfig::new("us-west-1", "arn:aws:sns:us-west-1:000000000000:audit")
            .with_credentials("abcdef", "123456");

        let debug = format!("{:?}", config);
        assert!(debug.contains("abcdef"));
        assert!(!debug.contains("123456\""));
        assert!(debug.contains("**********"));
    }

    #[test]
    fn test_serialized_config_omits_secret() {
        let config = SnsConfig::new("us-west-1", "arn:aws:sns:us-west-1:000000000000:audit")
            .with_credentials("abcdef", "123456");

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("abcdef"));
        assert!(!json.contains("secret_access_key"));
        assert!(!json.contains("123456"));

        let parsed: SnsConfig = serde_json::from_str(
            r#"{"region":"us-west-1","topic_arn":"t","access_key_id":"k","secret_access_key":"s","endpoint":null}"#,
        )
        .unwrap();
        assert_eq!(parsed.static_credentials(), Some(("k", "s")));
    }
}
