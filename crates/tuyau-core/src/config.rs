use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::context::DEFAULT_THREAD_COUNT;
use crate::error::{Result, TuyauError};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Execution engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker count used when the context reports `0` threads.
    #[serde(default = "default_thread_count")]
    pub default_thread_count: usize,
    /// How often the driver loop checks for termination.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Run the input/output hazard validation during build (default: true).
    #[serde(default = "default_check_io")]
    pub check_io: bool,
    /// Name given to worker threads.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_thread_count: default_thread_count(),
            poll_interval_ms: default_poll_interval_ms(),
            check_io: default_check_io(),
            thread_name: default_thread_name(),
        }
    }
}

fn default_thread_count() -> usize {
    DEFAULT_THREAD_COUNT
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_check_io() -> bool {
    true
}

fn default_thread_name() -> String {
    "tuyau-worker".to_string()
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Pick the worker count: the context's value unless it is `0`.
    pub fn resolve_threads(&self, context_threads: usize) -> usize {
        if context_threads > 0 {
            context_threads
        } else {
            self.default_thread_count.max(1)
        }
    }
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        load_toml(path)
    }
}

/// Read a TOML file, expand `${ENV_VAR}` references and deserialize it.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|_| TuyauError::ConfigNotFound(path.display().to_string()))?;

    let expanded = expand_env_vars(&content);

    toml::from_str(&expanded).map_err(|e| TuyauError::Config(e.to_string()))
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_TUYAU_VAR", "8");
        let result = expand_env_vars("default_thread_count = ${TEST_TUYAU_VAR}");
        assert_eq!(result, "default_thread_count = 8");
        std::env::remove_var("TEST_TUYAU_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("thread_name = \"${NONEXISTENT_TUYAU_VAR}\"");
        assert_eq!(result, "thread_name = \"${NONEXISTENT_TUYAU_VAR}\"");
    }

    #[test]
    fn test_engine_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.default_thread_count, 4);
        assert_eq!(config.engine.poll_interval_ms, 10);
        assert!(config.engine.check_io);
        assert_eq!(config.engine.thread_name, "tuyau-worker");
    }

    #[test]
    fn test_partial_engine_section() {
        let toml_str = r#"
[engine]
check_io = false
poll_interval_ms = 250
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(!config.engine.check_io);
        assert_eq!(config.engine.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.engine.default_thread_count, 4);
    }

    #[test]
    fn test_resolve_threads() {
        let engine = EngineConfig {
            default_thread_count: 6,
            ..EngineConfig::default()
        };
        assert_eq!(engine.resolve_threads(2), 2);
        assert_eq!(engine.resolve_threads(0), 6);
    }
}
