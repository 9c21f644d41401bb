use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Tasks live in memory when unset.
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl ServerConfig {
    /// Loads configuration from environment variables (`PORT`, `REDIS_URL`).
    pub fn from_env() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

fn default_port() -> u16 {
    8003
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_in_memory_on_8003() {
        let config: ServerConfig = config::Config::builder()
            .add_source(config::File::from_str("", config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.port, 8003);
        assert_eq!(config.redis_url, None);
    }
}
