use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentConfig {
    pub handler: HandlerConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HandlerConfig {
    /// Name of the thread that owns all camera session state
    #[serde(default = "default_handler_thread_name")]
    pub thread_name: String,

    /// Number of processed actions remembered for diagnostics
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DispatchConfig {
    /// Name of the thread that absorbs blocking state waits
    #[serde(default = "default_dispatch_thread_name")]
    pub thread_name: String,

    /// Maximum number of pending dispatch jobs
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound for synchronous jobs such as a synced camera release
    #[serde(default = "default_job_timeout_ms")]
    pub job_timeout_ms: u64,
}

impl DispatchConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }
}

impl AgentConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("camagent.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("handler.thread_name", default_handler_thread_name())?
            .set_default("handler.history_size", default_history_size() as i64)?
            .set_default("dispatch.thread_name", default_dispatch_thread_name())?
            .set_default("dispatch.queue_capacity", default_queue_capacity() as i64)?
            .set_default("dispatch.job_timeout_ms", default_job_timeout_ms())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with CAMAGENT__ prefix
            .add_source(
                Environment::with_prefix("CAMAGENT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: AgentConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handler.thread_name.trim().is_empty() {
            return Err(ConfigError::Message(
                "Handler thread name must not be empty".to_string(),
            ));
        }

        if self.handler.history_size == 0 {
            return Err(ConfigError::Message(
                "Handler history size must be greater than 0".to_string(),
            ));
        }

        if self.dispatch.thread_name.trim().is_empty() {
            return Err(ConfigError::Message(
                "Dispatch thread name must not be empty".to_string(),
            ));
        }

        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Dispatch queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.dispatch.job_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Dispatch job timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            handler: HandlerConfig {
                thread_name: default_handler_thread_name(),
                history_size: default_history_size(),
            },
            dispatch: DispatchConfig {
                thread_name: default_dispatch_thread_name(),
                queue_capacity: default_queue_capacity(),
                job_timeout_ms: default_job_timeout_ms(),
            },
        }
    }
}

// Default value functions
fn default_handler_thread_name() -> String {
    "camera-handler".to_string()
}
fn default_history_size() -> usize {
    400
}

fn default_dispatch_thread_name() -> String {
    "camera-dispatch".to_string()
}
fn default_queue_capacity() -> usize {
    256
}
fn default_job_timeout_ms() -> u64 {
    3500
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.handler.history_size, 400);
        assert_eq!(config.dispatch.queue_capacity, 256);
        assert_eq!(config.dispatch.job_timeout(), Duration::from_millis(3500));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[handler]\nthread_name = \"cam-main\"\n\n[dispatch]\nqueue_capacity = 8\n"
        )
        .unwrap();

        let config = AgentConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.handler.thread_name, "cam-main");
        assert_eq!(config.handler.history_size, 400);
        assert_eq!(config.dispatch.queue_capacity, 8);
        assert_eq!(config.dispatch.thread_name, "camera-dispatch");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AgentConfig::load_from_file("/nonexistent/camagent-test.toml").unwrap();
        assert_eq!(config.handler.thread_name, "camera-handler");
        assert_eq!(config.dispatch.job_timeout_ms, 3500);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AgentConfig::default();

        config.dispatch.queue_capacity = 0;
        assert!(config.validate().is_err());

        config.dispatch.queue_capacity = 16;
        config.handler.thread_name = "  ".to_string();
        assert!(config.validate().is_err());

        config.handler.thread_name = "camera-handler".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serializes_to_toml() {
        let text = toml::to_string_pretty(&AgentConfig::default()).unwrap();
        assert!(text.contains("[handler]"));
        assert!(text.contains("job_timeout_ms = 3500"));
    }
}
