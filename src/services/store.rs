//! JSON record store
//!
//! One pretty-printed JSON file per service definition, named by the injected
//! [`NamingStrategy`]. The store keeps no state beyond its directory, so the
//! working directory is always the source of truth.

use super::naming::NamingStrategy;
use super::RegisteredService;
use crate::error::{RegistryError, RegistryResult};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Suffix of the hidden file a record is written to before it is renamed
pub const STAGING_SUFFIX: &str = ".tmp";

/// A single visible `*.json` path component
fn is_plain_record_name(file_name: &str) -> bool {
    let mut components = Path::new(file_name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !file_name.starts_with('.')
        && file_name.ends_with(".json")
}

/// Anything that can hand over a full set of service definitions
///
/// Used once during bootstrap to read the registry that existed before
/// version control was introduced.
pub trait ServiceSource: Send + Sync {
    fn load_all(&self) -> RegistryResult<Vec<RegisteredService>>;
}

impl ServiceSource for Vec<RegisteredService> {
    fn load_all(&self) -> RegistryResult<Vec<RegisteredService>> {
        Ok(self.clone())
    }
}

/// Reads and writes service definitions as files in a directory
#[derive(Clone)]
pub struct JsonServiceStore {
    dir: PathBuf,
    naming: Arc<dyn NamingStrategy>,
}

impl std::fmt::Debug for JsonServiceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonServiceStore")
            .field("dir", &self.dir)
            .finish()
    }
}

impl JsonServiceStore {
    pub fn new(dir: impl Into<PathBuf>, naming: Arc<dyn NamingStrategy>) -> Self {
        Self {
            dir: dir.into(),
            naming,
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn naming(&self) -> &Arc<dyn NamingStrategy> {
        &self.naming
    }

    /// File name a definition is stored under
    pub fn file_name(&self, service: &RegisteredService) -> String {
        self.naming.name(service)
    }

    /// Read every `*.json` record in the directory
    ///
    /// A missing directory is an empty registry. A malformed record fails the
    /// whole load and names the offending file.
    pub fn load_all(&self) -> RegistryResult<Vec<RegisteredService>> {
        if !self.dir.exists() {
            debug!("Registry directory {:?} does not exist, treating as empty", self.dir);
            return Ok(Vec::new());
        }

        let mut services = Vec::new();
        for path in self.record_files()? {
            services.push(self.read_record(&path)?);
        }

        trace!("Loaded {} service definitions from {:?}", services.len(), self.dir);
        Ok(services)
    }

    /// Write a definition, replacing any earlier file for the same id
    ///
    /// Returns the path written.
    pub fn save(&self, service: &RegisteredService) -> RegistryResult<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            RegistryError::persistence(&self.dir, format!("Failed to create directory: {}", e))
        })?;

        let file_name = self.file_name(service);
        let target = self.dir.join(&file_name);
        if !is_plain_record_name(&file_name) {
            return Err(RegistryError::persistence(
                &target,
                format!("Record name '{}' is not a plain file name in the registry", file_name),
            ));
        }

        let json = serde_json::to_string_pretty(service).map_err(|e| {
            RegistryError::persistence(&target, format!("Failed to serialize service: {}", e))
        })?;

        let staging = self.dir.join(format!(".{}{}", file_name, STAGING_SUFFIX));
        fs::write(&staging, json).map_err(|e| {
            RegistryError::persistence(&staging, format!("Failed to write record: {}", e))
        })?;
        fs::rename(&staging, &target).map_err(|e| {
            RegistryError::persistence(&target, format!("Failed to move record into place: {}", e))
        })?;

        // a rename changes the file name; drop the stale copy
        for stale in self.files_for_id(service.id)? {
            if stale != target {
                debug!("Removing stale record {:?} for service {}", stale, service.id);
                fs::remove_file(&stale).map_err(|e| {
                    RegistryError::persistence(&stale, format!("Failed to remove stale record: {}", e))
                })?;
            }
        }

        debug!("Saved service {} to {:?}", service.id, target);
        Ok(target)
    }

    /// Remove every file holding the definition with `id`
    ///
    /// Returns whether anything was removed.
    pub fn remove(&self, id: i64) -> RegistryResult<bool> {
        let files = self.files_for_id(id)?;
        for file in &files {
            fs::remove_file(file).map_err(|e| {
                RegistryError::persistence(file, format!("Failed to remove record: {}", e))
            })?;
            debug!("Removed record {:?}", file);
        }
        Ok(!files.is_empty())
    }

    /// Files currently holding the definition with `id`
    pub fn files_for_id(&self, id: i64) -> RegistryResult<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        for path in self.record_files()? {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !self.naming.matches_id(file_name, id) {
                continue;
            }
            // the name matched; confirm against the content
            if self.read_record(&path).map(|s| s.id == id).unwrap_or(false) {
                matches.push(path);
            }
        }
        Ok(matches)
    }

    fn record_files(&self) -> RegistryResult<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            RegistryError::persistence(&self.dir, format!("Failed to read directory: {}", e))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                RegistryError::persistence(&self.dir, format!("Failed to read entry: {}", e))
            })?;
            let path = entry.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if !hidden && path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_record(&self, path: &Path) -> RegistryResult<RegisteredService> {
        let content = fs::read_to_string(path).map_err(|e| {
            RegistryError::persistence(path, format!("Failed to read record: {}", e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            RegistryError::persistence(path, format!("Malformed service definition: {}", e))
        })
    }
}

impl ServiceSource for JsonServiceStore {
    fn load_all(&self) -> RegistryResult<Vec<RegisteredService>> {
        JsonServiceStore::load_all(self)
    }
}
