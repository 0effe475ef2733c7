//! Configuration management for the prediction service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Environment variable pointing at the configuration file
pub const CONFIG_PATH_ENV: &str = "SOLACE_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Forward-pass implementation to load at startup
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process LSTM over a safetensors state dict
    #[default]
    Native,
    /// ONNX Runtime session over an exported graph
    Onnx,
}

/// Where the forward pass should run
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Accelerator when available, CPU otherwise
    #[default]
    Auto,
    Cpu,
    Cuda,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub response: ResponseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Model and scaler artifacts
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Forward-pass backend
    #[serde(default)]
    pub backend: BackendKind,
    /// Device preference for backends that can use an accelerator
    #[serde(default)]
    pub device: DevicePreference,
    /// Model weights (`.safetensors` for native, `.onnx` for onnx)
    pub model_path: String,
    /// Pre-fitted scaler parameters (JSON)
    pub scaler_path: String,
    /// Threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
    /// State-dict prefix of the recurrent layers
    #[serde(default = "default_lstm_prefix")]
    pub lstm_prefix: String,
    /// State-dict prefix of the linear output layer
    #[serde(default = "default_head_prefix")]
    pub head_prefix: String,
    /// When set, the loaded weights must have this hidden width
    #[serde(default)]
    pub hidden_size: Option<usize>,
    /// When set, the loaded weights must have this many layers
    #[serde(default)]
    pub num_layers: Option<usize>,
    /// When set, the loaded weights must match this directionality
    #[serde(default)]
    pub bidirectional: Option<bool>,
}

fn default_onnx_threads() -> usize {
    1
}

fn default_lstm_prefix() -> String {
    "lstm".to_string()
}

fn default_head_prefix() -> String {
    "fc".to_string()
}

/// Shape of successful responses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseConfig {
    /// Add a `probabilities` array next to `predictions`
    #[serde(default)]
    pub include_probabilities: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

/// Periodic metrics summary
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between summaries in the log; 0 disables the reporter
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

fn default_report_interval() -> u64 {
    30
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `$SOLACE_CONFIG` or `config/config.toml`
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, with `SOLACE__SECTION__KEY` overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("SOLACE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            models: ModelsConfig {
                backend: BackendKind::Native,
                device: DevicePreference::Auto,
                model_path: "models/solace_lstm_model.safetensors".to_string(),
                scaler_path: "models/scaler.json".to_string(),
                onnx_threads: default_onnx_threads(),
                lstm_prefix: default_lstm_prefix(),
                head_prefix: default_head_prefix(),
                hidden_size: None,
                num_layers: None,
                bidirectional: None,
            },
            response: ResponseConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
            metrics: MetricsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.models.backend, BackendKind::Native);
        assert_eq!(config.models.device, DevicePreference::Auto);
        assert_eq!(config.models.lstm_prefix, "lstm");
        assert!(!config.response.include_probabilities);
    }

    #[test]
    fn test_load_from_file_applies_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
host = "127.0.0.1"
port = 8080

[models]
backend = "onnx"
device = "cpu"
model_path = "models/solace.onnx"
scaler_path = "models/scaler.json"

[logging]
level = "debug"
format = "pretty"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.models.backend, BackendKind::Onnx);
        assert_eq!(config.models.device, DevicePreference::Cpu);
        assert_eq!(config.models.onnx_threads, 1);
        assert_eq!(config.models.head_prefix, "fc");
        assert_eq!(config.models.hidden_size, None);
        assert_eq!(config.metrics.report_interval_secs, 30);
    }
}
