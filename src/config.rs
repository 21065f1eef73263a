//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;

/// Agent configuration.
///
/// Poll delays must satisfy `initial_poll_delay < poll_interval <= retry_backoff`
/// (checked by [`AgentConfig::validate`]): the first status check happens soon
/// after job creation, steady-state polling is slower, and transient-failure
/// retries back off further still.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent name for identification.
    pub name: String,
    /// Delay before the first status poll after job creation.
    pub initial_poll_delay: Duration,
    /// Steady-state delay between polls while the remote job is running.
    pub poll_interval: Duration,
    /// Backoff delay after a transient remote failure during polling.
    pub retry_backoff: Duration,
    /// Port for the WebSocket/REST server.
    pub ws_port: u16,
    /// Path to the local database file.
    pub db_path: String,
    /// Base URL of the image-generation MCP service.
    pub image_service_url: String,
    /// Base URL of the file-storage MCP service.
    pub filestore_service_url: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "image-agent".to_string(),
            initial_poll_delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(15),
            ws_port: 8080,
            db_path: "./data/image-agent.db".to_string(),
            image_service_url: "https://image.mcp.atxp.ai".to_string(),
            filestore_service_url: "https://filestore.mcp.atxp.ai".to_string(),
        }
    }
}

impl AgentConfig {
    /// Build a config from `IMAGE_AGENT_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("IMAGE_AGENT_WS_PORT") {
            config.ws_port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "IMAGE_AGENT_WS_PORT".to_string(),
                message: format!("not a valid port: {port}"),
            })?;
        }
        if let Ok(path) = std::env::var("IMAGE_AGENT_DB_PATH") {
            config.db_path = path;
        }
        if let Ok(url) = std::env::var("IMAGE_AGENT_IMAGE_SERVICE_URL") {
            config.image_service_url = url;
        }
        if let Ok(url) = std::env::var("IMAGE_AGENT_FILESTORE_URL") {
            config.filestore_service_url = url;
        }
        if let Some(delay) = read_secs("IMAGE_AGENT_INITIAL_POLL_SECS")? {
            config.initial_poll_delay = delay;
        }
        if let Some(delay) = read_secs("IMAGE_AGENT_POLL_INTERVAL_SECS")? {
            config.poll_interval = delay;
        }
        if let Some(delay) = read_secs("IMAGE_AGENT_RETRY_BACKOFF_SECS")? {
            config.retry_backoff = delay;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the poll-delay ordering invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_poll_delay >= self.poll_interval {
            return Err(ConfigError::InvalidValue {
                key: "initial_poll_delay".to_string(),
                message: "must be shorter than poll_interval".to_string(),
            });
        }
        if self.poll_interval > self.retry_backoff {
            return Err(ConfigError::InvalidValue {
                key: "retry_backoff".to_string(),
                message: "must be at least poll_interval".to_string(),
            });
        }
        Ok(())
    }
}

fn read_secs(key: &str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("not a number of seconds: {raw}"),
            })?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delays_are_ordered() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.initial_poll_delay < config.poll_interval);
        assert!(config.poll_interval <= config.retry_backoff);
    }

    #[test]
    fn rejects_inverted_delays() {
        let config = AgentConfig {
            initial_poll_delay: Duration::from_secs(30),
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AgentConfig {
            retry_backoff: Duration::from_secs(1),
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn equal_poll_and_backoff_allowed() {
        let config = AgentConfig {
            poll_interval: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(10),
            ..AgentConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
