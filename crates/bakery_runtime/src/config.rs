use thiserror::Error;

pub const BATCH_QUEUE_URL_VAR: &str = "BATCH_QUEUE_URL";
pub const OUTCOMES_BUCKET_VAR: &str = "OUTCOMES_BUCKET";
pub const OUTCOMES_PREFIX_VAR: &str = "OUTCOMES_PREFIX";
pub const DEFAULT_OUTCOMES_PREFIX: &str = "bakery/outcomes";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub queue_url: String,
    pub outcomes_bucket: String,
    pub outcomes_prefix: String,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        Ok(Self {
            queue_url: required(BATCH_QUEUE_URL_VAR)?,
            outcomes_bucket: required(OUTCOMES_BUCKET_VAR)?,
            outcomes_prefix: lookup(OUTCOMES_PREFIX_VAR)
                .map(|value| value.trim().trim_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_OUTCOMES_PREFIX.to_string()),
        })
    }

    /// Locator for the bucket that receives outcome records.
    pub fn outcomes_locator(&self) -> String {
        format!("s3://{}", self.outcomes_bucket)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn requires_queue_url_and_bucket() {
        assert_eq!(
            RuntimeConfig::from_lookup(lookup(&[(OUTCOMES_BUCKET_VAR, "bucket")])),
            Err(ConfigError::Missing(BATCH_QUEUE_URL_VAR))
        );
        let error = RuntimeConfig::from_lookup(lookup(&[(BATCH_QUEUE_URL_VAR, "https://q"), (OUTCOMES_BUCKET_VAR, " ")]))
            .expect_err("blank bucket");
        assert_eq!(error.to_string(), "OUTCOMES_BUCKET must be configured");
    }

    #[test]
    fn prefix_defaults_and_is_trimmed() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (BATCH_QUEUE_URL_VAR, "https://sqs/queue.fifo"),
            (OUTCOMES_BUCKET_VAR, "bucket"),
        ]))
        .expect("valid config");
        assert_eq!(config.outcomes_prefix, DEFAULT_OUTCOMES_PREFIX);
        assert_eq!(config.outcomes_locator(), "s3://bucket");

        let custom = RuntimeConfig::from_lookup(lookup(&[
            (BATCH_QUEUE_URL_VAR, "https://sqs/queue.fifo"),
            (OUTCOMES_BUCKET_VAR, "bucket"),
            (OUTCOMES_PREFIX_VAR, "/runs/outcomes/"),
        ]))
        .expect("valid config");
        assert_eq!(custom.outcomes_prefix, "runs/outcomes");
    }
}
