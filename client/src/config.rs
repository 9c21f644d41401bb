use std::time::Duration;

use serde::Deserialize;

/// Who the engine acts for. Passed in at construction; never read from ambient storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    /// Opaque session token, forwarded as a bearer token when present.
    pub token: Option<String>,
}

impl Identity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub email: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl ClientConfig {
    /// Loads configuration from `TASKGURU_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("TASKGURU"))
            .build()?;
        Self::from_settings(settings)
    }

    /// Loads configuration from a TOML file, with `TASKGURU_*` variables taking precedence.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("TASKGURU"))
            .build()?;
        Self::from_settings(settings)
    }

    fn from_settings(settings: config::Config) -> anyhow::Result<Self> {
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.call_timeout_ms == 0 {
            anyhow::bail!("call_timeout_ms must be greater than zero");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn identity(&self) -> Identity {
        Identity {
            email: self.email.clone(),
            token: self.token.clone(),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8003".to_string()
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> ClientConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_apply_when_only_email_is_set() {
        let config = from_toml(r#"email = "ann@example.com""#);

        assert_eq!(config.base_url, "http://127.0.0.1:8003");
        assert_eq!(config.token, None);
        assert_eq!(config.call_timeout(), Duration::from_secs(10));
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.identity(), Identity::new("ann@example.com"));
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let config = from_toml(
            r#"
                base_url = "https://tasks.example.com"
                email = "bob@example.com"
                token = "secret"
                call_timeout_ms = 2500
                poll_interval_secs = 5
            "#,
        );

        assert_eq!(config.base_url, "https://tasks.example.com");
        assert_eq!(config.call_timeout(), Duration::from_millis(2500));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(
            config.identity(),
            Identity::new("bob@example.com").with_token("secret")
        );
    }

    fn load(toml: &str) -> anyhow::Result<ClientConfig> {
        ClientConfig::from_settings(
            config::Config::builder()
                .add_source(config::File::from_str(toml, config::FileFormat::Toml))
                .build()?,
        )
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let err = load(
            r#"
                email = "ann@example.com"
                poll_interval_secs = 0
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("poll_interval_secs"));
    }

    #[test]
    fn test_zero_call_timeout_is_rejected() {
        let err = load(
            r#"
                email = "ann@example.com"
                call_timeout_ms = 0
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("call_timeout_ms"));
    }

    #[test]
    fn test_valid_values_pass_validation() {
        let config = load(r#"email = "ann@example.com""#).unwrap();

        assert_eq!(config.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_email_is_an_error() {
        let result = config::Config::builder()
            .add_source(config::File::from_str("", config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize::<ClientConfig>();

        assert!(result.is_err());
    }
}
