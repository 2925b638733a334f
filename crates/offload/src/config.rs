use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::sum::DEFAULT_MAX_INPUT_BOUND;

pub const DEFAULT_MAX_BACKLOG: usize = 64;
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatcher settings. Keys in configuration files use the camelCase
/// names (`poolCapacity`, `maxBacklog`, `taskTimeout` in milliseconds,
/// `maxInputBound`); missing keys fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Maximum number of execution units running at once.
    pub pool_capacity: usize,
    /// Maximum number of tasks waiting for a slot.
    pub max_backlog: usize,
    #[serde(deserialize_with = "duration_from_millis")]
    pub task_timeout: Duration,
    /// Inputs above this are clamped before execution.
    pub max_input_bound: u64,
    /// Stack size for execution unit threads; platform default if unset.
    pub worker_stack_size: Option<usize>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let pool_capacity = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            pool_capacity,
            max_backlog: DEFAULT_MAX_BACKLOG,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            max_input_bound: DEFAULT_MAX_INPUT_BOUND,
            worker_stack_size: None,
        }
    }
}

impl DispatcherConfig {
    pub fn with_pool_capacity(mut self, pool_capacity: usize) -> Self {
        self.pool_capacity = pool_capacity;
        self
    }

    pub fn with_max_backlog(mut self, max_backlog: usize) -> Self {
        self.max_backlog = max_backlog;
        self
    }

    pub fn with_task_timeout(mut self, task_timeout: Duration) -> Self {
        self.task_timeout = task_timeout;
        self
    }

    pub fn with_max_input_bound(mut self, max_input_bound: u64) -> Self {
        self.max_input_bound = max_input_bound;
        self
    }

    pub fn with_worker_stack_size(mut self, worker_stack_size: usize) -> Self {
        self.worker_stack_size = Some(worker_stack_size);
        self
    }

    /// Maximum number of tasks the pool holds, running or queued.
    pub fn max_outstanding(&self) -> usize {
        self.pool_capacity.saturating_add(self.max_backlog)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_capacity == 0 {
            return Err(Error::InvalidConfig(
                "poolCapacity must be at least 1".into(),
            ));
        }
        if self.task_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "taskTimeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(s).map_err(|err| Error::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| {
            Error::InvalidConfig(format!("cannot read {}: {}", path.display(), err))
        })?;
        Self::from_json_str(&contents)
    }
}

fn duration_from_millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_config_deserialization() {
        let config = r#"
        {
            "poolCapacity": 2,
            "maxBacklog": 8,
            "taskTimeout": 1500,
            "maxInputBound": 1000
        }
        "#;

        let config = DispatcherConfig::from_json_str(config).unwrap();
        assert_eq!(config.pool_capacity, 2);
        assert_eq!(config.max_backlog, 8);
        assert_eq!(config.task_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_input_bound, 1000);
        assert_eq!(config.max_outstanding(), 10);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = DispatcherConfig::from_json_str(r#"{ "maxBacklog": 3 }"#).unwrap();
        let defaults = DispatcherConfig::default();

        assert_eq!(config.max_backlog, 3);
        assert_eq!(config.pool_capacity, defaults.pool_capacity);
        assert_eq!(config.task_timeout, DEFAULT_TASK_TIMEOUT);
        assert_eq!(config.max_input_bound, DEFAULT_MAX_INPUT_BOUND);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            DispatcherConfig::from_json_str(r#"{ "poolCapacity": 0 }"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            DispatcherConfig::from_json_str(r#"{ "taskTimeout": 0 }"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            DispatcherConfig::from_json_str(r#"{ "poolSize": 4 }"#),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "poolCapacity": 3, "taskTimeout": 250 }}"#).unwrap();

        let config = DispatcherConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pool_capacity, 3);
        assert_eq!(config.task_timeout, Duration::from_millis(250));

        assert!(DispatcherConfig::from_file("/nonexistent/offload.json").is_err());
    }
}
