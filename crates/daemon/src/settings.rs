//! Settings: TOML file plus `LIGHTQ__*` environment overrides
//!
//! ```toml
//! default_backend = "sqlite"
//! middleware = ["logging", "transaction"]
//! dequeue_timeout_secs = 5
//! shutdown_grace_secs = 30
//!
//! [workers]
//! emails = 2
//!
//! [backend_overrides]
//! reports = "synchronous"
//!
//! [sqlite]
//! path = "~/.lightq/queue.db"
//! max_deliveries = 3
//! ```
//!
//! Nested keys use `__`: `LIGHTQ__WORKERS__EMAILS=4`, `LIGHTQ__SQLITE__PATH=/tmp/q.db`.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use lightq_core::application::{BackendSelection, DEFAULT_MIDDLEWARE, SYNCHRONOUS_BACKEND};
use lightq_core::application::worker::constants::{
    DEFAULT_DEQUEUE_TIMEOUT, DEFAULT_SHUTDOWN_GRACE_PERIOD,
};
use lightq_core::domain::QueueName;
use lightq_infra_sqlite::{DEFAULT_MAX_DELIVERIES, SQLITE_BACKEND};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "LIGHTQ";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Backend for queues without an override
    pub default_backend: String,
    /// Middleware names, outermost first
    pub middleware: Vec<String>,
    pub dequeue_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    /// Queue -> worker count
    pub workers: BTreeMap<String, u32>,
    /// Queue -> backend name
    pub backend_overrides: BTreeMap<String, String>,
    pub sqlite: Option<SqliteSettings>,
    pub command: CommandSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_backend: SYNCHRONOUS_BACKEND.to_string(),
            middleware: DEFAULT_MIDDLEWARE.iter().map(|s| s.to_string()).collect(),
            dequeue_timeout_secs: DEFAULT_DEQUEUE_TIMEOUT.as_secs(),
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_PERIOD.as_secs(),
            workers: BTreeMap::new(),
            backend_overrides: BTreeMap::new(),
            sqlite: None,
            command: CommandSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteSettings {
    pub path: String,
    /// Deliveries of one job before it is dropped as poison
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u32,
}

fn default_max_deliveries() -> u32 {
    DEFAULT_MAX_DELIVERIES
}

impl SqliteSettings {
    /// Database path with `~` expanded
    pub fn path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).into_owned())
    }
}

/// The built-in `command` task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    /// Queue `command` and `noop` jobs go to unless the producer says otherwise
    pub queue: String,
    /// Environment variables a job may set for its command
    pub env_allowlist: Vec<String>,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            queue: "default".to_string(),
            env_allowlist: vec!["PATH".to_string(), "HOME".to_string(), "USER".to_string()],
        }
    }
}

impl Settings {
    /// Load from `path` (if any) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read configuration {}", p.display()))?;
                Self::build(Some(&text), None)
                    .with_context(|| format!("Failed to load configuration from {}", p.display()))
            }
            None => Self::build(None, None).context("Failed to load configuration"),
        }
    }

    /// Parse a TOML document, with `env` standing in for the process environment
    pub fn from_toml(toml: &str, env: HashMap<String, String>) -> Result<Self> {
        Self::build(Some(toml), Some(env))
    }

    fn build(source: Option<&str>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(source) = source {
            builder = builder.add_source(File::from_str(source, FileFormat::Toml));
        }
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("middleware")
            .source(env);
        let mut settings: Settings = builder.add_source(environment).build()?.try_deserialize()?;

        // `config` lowercases every key; queue names keep the case the file gives them
        if let Some(source) = source {
            let document: toml::Table = source.parse().context("invalid TOML")?;
            settings.workers = restore_queue_case(settings.workers, &document, "workers")?;
            settings.backend_overrides =
                restore_queue_case(settings.backend_overrides, &document, "backend_overrides")?;
        }
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.dequeue_timeout_secs == 0 {
            bail!("dequeue_timeout_secs must be at least 1");
        }
        let wants_sqlite = self.default_backend == SQLITE_BACKEND
            || self.backend_overrides.values().any(|b| b == SQLITE_BACKEND);
        if wants_sqlite && self.sqlite.is_none() {
            bail!("backend '{}' is selected but there is no [sqlite] section", SQLITE_BACKEND);
        }
        if self.sqlite.as_ref().is_some_and(|s| s.max_deliveries == 0) {
            bail!("[sqlite] max_deliveries must be at least 1");
        }
        Ok(())
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_secs(self.dequeue_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn worker_counts(&self) -> Result<Vec<(QueueName, u32)>> {
        self.workers
            .iter()
            .map(|(queue, count)| {
                let queue = QueueName::new(queue.as_str())
                    .with_context(|| format!("invalid queue in [workers]: '{}'", queue))?;
                Ok((queue, *count))
            })
            .collect()
    }

    pub fn backend_selection(&self) -> Result<BackendSelection> {
        let mut selection = BackendSelection::new(&self.default_backend);
        for (queue, backend) in &self.backend_overrides {
            let queue = QueueName::new(queue.as_str())
                .with_context(|| format!("invalid queue in [backend_overrides]: '{}'", queue))?;
            selection = selection.with_override(queue, backend);
        }
        Ok(selection)
    }

    pub fn command_queue(&self) -> Result<QueueName> {
        QueueName::new(self.command.queue.as_str())
            .with_context(|| format!("invalid command queue '{}'", self.command.queue))
    }
}

/// Re-key `map` with the spelling `[table]` uses in the TOML document.
/// Keys that only came from the environment stay lowercase.
fn restore_queue_case<V>(
    map: BTreeMap<String, V>,
    document: &toml::Table,
    table: &str,
) -> Result<BTreeMap<String, V>> {
    let Some(written) = document.get(table).and_then(toml::Value::as_table) else {
        return Ok(map);
    };
    let mut spelled: HashMap<String, &str> = HashMap::new();
    for key in written.keys() {
        if let Some(other) = spelled.insert(key.to_lowercase(), key) {
            bail!("[{}] has queues '{}' and '{}' that differ only by case", table, other, key);
        }
    }
    Ok(map
        .into_iter()
        .map(|(key, value)| match spelled.get(&key) {
            Some(original) => (original.to_string(), value),
            None => (key, value),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    const SAMPLE: &str = r#"
        default_backend = "sqlite"
        middleware = ["logging"]
        shutdown_grace_secs = 10

        [workers]
        emails = 2
        reports = 1

        [backend_overrides]
        reports = "synchronous"

        [sqlite]
        path = "/tmp/lightq.db"
    "#;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml("", HashMap::new()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.default_backend, "synchronous");
        assert_eq!(settings.middleware, vec!["logging", "transaction"]);
        assert_eq!(settings.dequeue_timeout(), Duration::from_secs(5));
        assert_eq!(settings.shutdown_grace(), Duration::from_secs(30));
    }

    #[test]
    fn test_file_values() {
        let settings = Settings::from_toml(SAMPLE, HashMap::new()).unwrap();
        assert_eq!(settings.default_backend, "sqlite");
        assert_eq!(settings.middleware, vec!["logging"]);
        assert_eq!(settings.shutdown_grace_secs, 10);
        assert_eq!(settings.workers.get("emails"), Some(&2));
        assert_eq!(settings.sqlite.unwrap().path(), PathBuf::from("/tmp/lightq.db"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let env = HashMap::from([
            ("LIGHTQ__SHUTDOWN_GRACE_SECS".to_string(), "3".to_string()),
            ("LIGHTQ__WORKERS__EMAILS".to_string(), "7".to_string()),
            ("LIGHTQ__MIDDLEWARE".to_string(), "transaction,logging".to_string()),
        ]);
        let settings = Settings::from_toml(SAMPLE, env).unwrap();
        assert_eq!(settings.shutdown_grace_secs, 3);
        assert_eq!(settings.workers.get("emails"), Some(&7));
        assert_eq!(settings.middleware, vec!["transaction", "logging"]);
    }

    #[test]
    fn test_sqlite_backend_requires_section() {
        let err = Settings::from_toml(r#"default_backend = "sqlite""#, HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("[sqlite]"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert_err!(Settings::from_toml("dequeue_timeout_secs = 0", HashMap::new()));
    }

    #[test]
    fn test_backend_selection() {
        let settings = Settings::from_toml(SAMPLE, HashMap::new()).unwrap();
        let selection = settings.backend_selection().unwrap();
        assert_eq!(selection.backend_name(&QueueName::new("emails").unwrap()), "sqlite");
        assert_eq!(
            selection.backend_name(&QueueName::new("reports").unwrap()),
            "synchronous"
        );
    }

    #[test]
    fn test_mixed_case_queue_names_survive() {
        let toml = r#"
            [workers]
            Emails = 2
            reports = 1

            [backend_overrides]
            Emails = "synchronous"
        "#;
        let env = HashMap::from([("LIGHTQ__WORKERS__EMAILS".to_string(), "5".to_string())]);
        let settings = Settings::from_toml(toml, env).unwrap();

        assert_eq!(settings.workers.get("Emails"), Some(&5));
        assert!(!settings.workers.contains_key("emails"));
        assert_eq!(settings.workers.get("reports"), Some(&1));

        let counts = settings.worker_counts().unwrap();
        assert!(counts.contains(&(QueueName::new("Emails").unwrap(), 5)));
        let selection = settings.backend_selection().unwrap();
        assert_eq!(
            selection.backend_name(&QueueName::new("Emails").unwrap()),
            "synchronous"
        );
    }

    #[test]
    fn test_queues_differing_only_by_case_rejected() {
        let err = Settings::from_toml("[workers]
Emails = 1
emails = 2", HashMap::new())
            .unwrap_err();
        assert!(format!("{:#}", err).contains("differ only by case"));
    }

    #[test]
    fn test_invalid_queue_name() {
        let settings = Settings::from_toml("[workers]\n\"bad queue\" = 1", HashMap::new()).unwrap();
        assert_err!(settings.worker_counts());
    }
}
