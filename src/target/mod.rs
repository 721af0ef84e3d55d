//! File targets and session resolution
//!
//! A file target is an opaque id naming one remote host (and a default
//! directory on it). Requests resolve the id once into a [`FileTarget`]
//! holding the open session plus the label and address used in log and
//! notification text.
//!
//! - [`SessionResolver`]: id -> [`FileTarget`]
//! - [`StaticResolver`]: fixed set of already-open sessions
//! - [`TargetStore`]: JSON-persisted target definitions
//! - [`RegistryResolver`]: resolves stored targets, connecting lazily and
//!   caching one session per target

use crate::config::RemoteConfig;
use crate::error::{HostFilesError, IoResultExt, Result};
use crate::remote::RemoteFs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A resolved file target, immutable for the duration of a request
#[derive(Clone)]
pub struct FileTarget {
    /// Target id
    pub id: u64,
    /// Open remote session
    pub session: Arc<dyn RemoteFs>,
    /// Human-readable host label
    pub label: String,
    /// Host address
    pub address: String,
}

impl FileTarget {
    /// Create a target around an open session
    pub fn new(
        id: u64,
        session: Arc<dyn RemoteFs>,
        label: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            id,
            session,
            label: label.into(),
            address: address.into(),
        }
    }

    /// `label[address]`, used as the subject of operation log lines
    pub fn describe(&self) -> String {
        format!("{}[{}]", self.label, self.address)
    }

    /// `label[address:path]`, used in notification bodies
    pub fn describe_path(&self, path: &str) -> String {
        format!("{}[{}:{}]", self.label, self.address, path)
    }

    /// Session primitives
    pub fn fs(&self) -> &dyn RemoteFs {
        self.session.as_ref()
    }
}

impl fmt::Debug for FileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTarget")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Maps a file-target id to an open session
pub trait SessionResolver: Send + Sync {
    /// Resolve `target_id`, failing with `NotFound` for unknown ids
    fn resolve(&self, target_id: u64) -> Result<FileTarget>;
}

impl<T: SessionResolver + ?Sized> SessionResolver for Box<T> {
    fn resolve(&self, target_id: u64) -> Result<FileTarget> {
        (**self).resolve(target_id)
    }
}

/// Resolver over a fixed set of targets
#[derive(Default)]
pub struct StaticResolver {
    targets: HashMap<u64, FileTarget>,
}

impl StaticResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target under its id
    pub fn with_target(mut self, target: FileTarget) -> Self {
        self.targets.insert(target.id, target);
        self
    }
}

impl SessionResolver for StaticResolver {
    fn resolve(&self, target_id: u64) -> Result<FileTarget> {
        self.targets
            .get(&target_id)
            .cloned()
            .ok_or_else(|| HostFilesError::NotFound(format!("file target {}", target_id)))
    }
}

/// A stored target definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Id, assigned on first save
    #[serde(default)]
    pub id: u64,
    /// Display name
    pub name: String,
    /// Connection settings
    pub remote: RemoteConfig,
    /// Default directory on the host
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

fn default_base_path() -> String {
    "/".to_string()
}

/// JSON-persisted list of target definitions
#[derive(Debug)]
pub struct TargetStore {
    path: PathBuf,
    targets: Vec<TargetConfig>,
}

impl TargetStore {
    /// Load the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let targets = if path.exists() {
            let data = std::fs::read_to_string(&path).local_path(path.display().to_string())?;
            serde_json::from_str(&data)?
        } else {
            Vec::new()
        };
        Ok(Self { path, targets })
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All targets, ordered by id
    pub fn list(&self) -> &[TargetConfig] {
        &self.targets
    }

    /// Look up one target
    pub fn get(&self, id: u64) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.id == id)
    }

    /// Insert (id 0) or update a target and persist; returns its id
    pub fn save(&mut self, mut target: TargetConfig) -> Result<u64> {
        if target.name.trim().is_empty() {
            return Err(HostFilesError::invalid("target name must not be empty"));
        }

        if target.id == 0 {
            target.id = self.targets.iter().map(|t| t.id).max().unwrap_or(0) + 1;
            self.targets.push(target.clone());
        } else {
            match self.targets.iter_mut().find(|t| t.id == target.id) {
                Some(existing) => *existing = target.clone(),
                None => self.targets.push(target.clone()),
            }
        }
        self.targets.sort_by_key(|t| t.id);
        self.persist()?;

        tracing::debug!("Saved file target {} ({})", target.id, target.name);
        Ok(target.id)
    }

    /// Delete a target and persist
    pub fn delete(&mut self, id: u64) -> Result<TargetConfig> {
        let idx = self
            .targets
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| HostFilesError::NotFound(format!("file target {}", id)))?;
        let removed = self.targets.remove(idx);
        self.persist()?;
        Ok(removed)
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).local_path(parent.display().to_string())?;
        }
        let data = serde_json::to_string_pretty(&self.targets)?;
        std::fs::write(&self.path, data).local_path(self.path.display().to_string())
    }
}

type Connector = Box<dyn Fn(&TargetConfig) -> Result<Arc<dyn RemoteFs>> + Send + Sync>;

/// Resolves stored targets, opening one session per target on first use
pub struct RegistryResolver {
    store: TargetStore,
    connector: Connector,
    sessions: Mutex<HashMap<u64, Arc<dyn RemoteFs>>>,
}

impl RegistryResolver {
    /// Create a resolver that opens sessions with `connector`
    pub fn new<F>(store: TargetStore, connector: F) -> Self
    where
        F: Fn(&TargetConfig) -> Result<Arc<dyn RemoteFs>> + Send + Sync + 'static,
    {
        Self {
            store,
            connector: Box::new(connector),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &TargetStore {
        &self.store
    }

    /// Drop the cached session of a target
    pub fn disconnect(&self, id: u64) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(&id);
        }
    }
}

impl SessionResolver for RegistryResolver {
    fn resolve(&self, target_id: u64) -> Result<FileTarget> {
        let config = self
            .store
            .get(target_id)
            .ok_or_else(|| HostFilesError::NotFound(format!("file target {}", target_id)))?;

        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| HostFilesError::config("session cache poisoned"))?;

        let session = match sessions.get(&target_id) {
            Some(session) => Arc::clone(session),
            None => {
                let session = (self.connector)(config)?;
                sessions.insert(target_id, Arc::clone(&session));
                session
            }
        };

        Ok(FileTarget::new(
            target_id,
            session,
            config.name.clone(),
            config.remote.host.clone(),
        ))
    }
}
