//! Configuration types for the dataflow engine
//!
//! Values can come from defaults, a YAML file, or `FLOW_`-prefixed
//! environment variables (later sources win).

use crate::error::{FlowError, Result};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration shared by every operator of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Capacity of each record channel between adjacent operators
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Capacity of the shared error channel
    #[serde(default = "default_error_channel_capacity")]
    pub error_channel_capacity: usize,

    /// How often window operators check for closeable buckets (milliseconds)
    #[serde(default = "default_window_tick_ms")]
    pub window_tick_ms: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            error_channel_capacity: default_error_channel_capacity(),
            window_tick_ms: default_window_tick_ms(),
        }
    }
}

impl FlowConfig {
    /// Load configuration from an optional YAML file and the environment
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(FlowConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(Env::prefixed("FLOW_"));

        let config: FlowConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(FlowError::config(
                "channel_capacity must be greater than 0",
            ));
        }

        if self.error_channel_capacity == 0 {
            return Err(FlowError::config(
                "error_channel_capacity must be greater than 0",
            ));
        }

        if self.window_tick_ms == 0 {
            return Err(FlowError::config("window_tick_ms must be greater than 0"));
        }

        Ok(())
    }

    /// Window closing-check interval as a duration
    pub fn window_tick(&self) -> Duration {
        Duration::from_millis(self.window_tick_ms)
    }

    /// Set the per-edge channel capacity
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the window closing-check interval
    pub fn with_window_tick(mut self, tick: Duration) -> Self {
        self.window_tick_ms = tick.as_millis() as u64;
        self
    }
}

fn default_channel_capacity() -> usize {
    1
}

fn default_error_channel_capacity() -> usize {
    16
}

fn default_window_tick_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config_is_valid() {
        let config = FlowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.channel_capacity, 1);
        assert_eq!(config.window_tick(), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = FlowConfig::default().with_channel_capacity(0);
        assert!(config.validate().is_err());

        let config = FlowConfig {
            error_channel_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_tick_rejected() {
        let config = FlowConfig::default().with_window_tick(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "flow.yaml",
                r#"
                channel_capacity: 4
                window_tick_ms: 100
                "#,
            )?;
            jail.set_env("FLOW_WINDOW_TICK_MS", "250");

            let config = FlowConfig::load(Some("flow.yaml".into())).expect("config loads");
            assert_eq!(config.channel_capacity, 4);
            assert_eq!(config.window_tick_ms, 250);
            assert_eq!(config.error_channel_capacity, 16);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        Jail::expect_with(|jail| {
            jail.set_env("FLOW_CHANNEL_CAPACITY", "0");
            assert!(FlowConfig::load(None).is_err());
            Ok(())
        });
    }
}
