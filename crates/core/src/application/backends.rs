// Backend registry and per-queue backend selection

use crate::domain::QueueName;
use crate::error::{AppError, Result};
use crate::port::Backend;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Creates a backend instance; may be async (e.g. opening a connection pool)
pub type BackendFactory = Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn Backend>>> + Send + Sync>;

/// Backend name -> factory, populated at process startup
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> BoxFuture<'static, Result<Arc<dyn Backend>>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register an already constructed backend under `name`
    pub fn register_instance(&mut self, name: impl Into<String>, backend: Arc<dyn Backend>) -> &mut Self {
        self.register(name, move || {
            let backend = backend.clone();
            Box::pin(async move { Ok(backend) })
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    fn factory(&self, name: &str) -> Result<&BackendFactory> {
        self.factories
            .get(name)
            .ok_or_else(|| AppError::Config(format!("unknown backend '{}'", name)))
    }
}

/// Which backend each queue uses: per-queue override, else the default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSelection {
    pub default: String,
    pub overrides: BTreeMap<QueueName, String>,
}

impl BackendSelection {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, queue: QueueName, backend: impl Into<String>) -> Self {
        self.overrides.insert(queue, backend.into());
        self
    }

    pub fn backend_name(&self, queue: &QueueName) -> &str {
        self.overrides
            .get(queue)
            .map(String::as_str)
            .unwrap_or(&self.default)
    }
}

/// Resolves and caches one backend instance per backend name for this process
pub struct Backends {
    registry: BackendRegistry,
    selection: BackendSelection,
    instances: Mutex<HashMap<String, Arc<dyn Backend>>>,
}

impl Backends {
    /// Fails if the default or any override names an unregistered backend
    pub fn new(registry: BackendRegistry, selection: BackendSelection) -> Result<Self> {
        registry.factory(&selection.default)?;
        for (queue, name) in &selection.overrides {
            registry.factory(name).map_err(|_| {
                AppError::Config(format!(
                    "unknown backend '{}' configured for queue '{}'",
                    name, queue
                ))
            })?;
        }
        Ok(Self {
            registry,
            selection,
            instances: Mutex::new(HashMap::new()),
        })
    }

    pub fn selection(&self) -> &BackendSelection {
        &self.selection
    }

    pub fn backend_name(&self, queue: &QueueName) -> &str {
        self.selection.backend_name(queue)
    }

    /// Backend for `queue`, created on first use
    pub async fn for_queue(&self, queue: &QueueName) -> Result<Arc<dyn Backend>> {
        let name = self.selection.backend_name(queue);
        let mut instances = self.instances.lock().await;
        if let Some(backend) = instances.get(name) {
            return Ok(backend.clone());
        }

        let backend = (self.registry.factory(name)?)().await?;
        info!(backend = name, "Backend initialised");
        instances.insert(name.to_string(), backend.clone());
        Ok(backend)
    }
}
