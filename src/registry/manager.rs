//! Registry manager bound to a git working directory
//!
//! A [`VersionControlServicesManager`] is the unit handed to callers: it owns
//! one repository handle and a services manager whose record store points at
//! that handle's working directory. Saves only touch the working directory;
//! [`publish`](VersionControlServicesManager::publish) is the only operation
//! that produces history.

use crate::config::ManagementType;
use crate::error::{RegistryError, RegistryResult};
use crate::git::{ChangeStatus, CommitInfo, GitRepository, RepositoryHandle, WorkspaceLock};
use crate::services::{
    create_services_manager, JsonServiceStore, NamingStrategy, RegisteredService, ServiceSource,
    ServicesManager,
};
use git2::Oid;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Record file with an uncommitted change
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceChange {
    pub file: String,
    pub status: ChangeStatus,
    /// Working-directory version, or the committed one for deletions
    pub service: Option<RegisteredService>,
}

/// Direction for [`VersionControlServicesManager::reorder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Services manager whose state lives in a git working directory
pub struct VersionControlServicesManager {
    services: Box<dyn ServicesManager>,
    repository: RepositoryHandle,
}

impl std::fmt::Debug for VersionControlServicesManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionControlServicesManager")
            .field("repository", &self.repository)
            .field("services", &self.services.count())
            .finish()
    }
}

impl VersionControlServicesManager {
    /// Bind a fresh record store to `repository` and load it
    pub fn new(
        repository: RepositoryHandle,
        management_type: ManagementType,
        naming: Arc<dyn NamingStrategy>,
    ) -> RegistryResult<Self> {
        let store = JsonServiceStore::new(repository.path(), naming);
        let mut manager = Self {
            services: create_services_manager(management_type, store),
            repository,
        };
        manager.load()?;
        Ok(manager)
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repository
    }

    pub fn is_master(&self) -> bool {
        self.repository.is_master()
    }

    pub fn workspace_lock(&self) -> Option<WorkspaceLock> {
        self.repository.workspace_lock()
    }

    /// Re-read every definition from the working directory
    pub fn load(&mut self) -> RegistryResult<usize> {
        self.services.load()
    }

    /// Import every definition `source` holds, overwriting same-id records
    ///
    /// Records absent from `source` are left alone.
    pub fn load_from(&mut self, source: &dyn ServiceSource) -> RegistryResult<usize> {
        let imported = source.load_all()?;
        let count = imported.len();
        for service in imported {
            self.services.save(service)?;
        }
        info!("Imported {} services into {:?}", count, self.repository.path());
        Ok(count)
    }

    /// Persist one definition; nothing is committed
    pub fn save(&mut self, service: RegisteredService) -> RegistryResult<()> {
        debug!("Saving service {} ({}) in {:?}", service.id, service.name, self.repository.path());
        self.services.save(service)
    }

    /// Remove a definition; nothing is committed
    pub fn delete(&mut self, id: i64) -> RegistryResult<RegisteredService> {
        self.services
            .delete(id)?
            .ok_or(RegistryError::ServiceNotFound { id })
    }

    /// Stage everything, commit with `message` and mark the result published
    ///
    /// Returns the new commit, or `None` when there was nothing to commit.
    pub fn publish(&mut self, message: &str) -> RegistryResult<Option<Oid>> {
        self.repository.stage_all_changes()?;
        let commit = self.repository.commit(message)?;
        self.repository.mark_published()?;
        match commit {
            Some(oid) => info!("Published {} from {:?}", oid, self.repository.path()),
            None => debug!("Publish found no changes in {:?}", self.repository.path()),
        }
        Ok(commit)
    }

    pub fn find(&self, id: i64) -> Option<&RegisteredService> {
        self.services.find(id)
    }

    pub fn services(&self) -> Vec<RegisteredService> {
        self.services.services()
    }

    pub fn domains(&self) -> Vec<String> {
        self.services.domains()
    }

    pub fn services_in_domain(&self, domain: &str) -> Vec<RegisteredService> {
        self.services.services_in_domain(domain)
    }

    pub fn count(&self) -> usize {
        self.services.count()
    }

    /// Records that differ from the last commit
    pub fn changes(&self) -> RegistryResult<Vec<ServiceChange>> {
        let mut changes = Vec::new();
        for change in self.repository.status()? {
            let content = match change.status {
                ChangeStatus::Deleted => self.repository.read_committed(&change.file)?,
                _ => std::fs::read(self.repository.path().join(&change.file)).ok(),
            };
            let service = content.and_then(|bytes| match serde_json::from_slice(&bytes) {
                Ok(service) => Some(service),
                Err(e) => {
                    warn!("Changed file {} is not a service definition: {}", change.file, e);
                    None
                }
            });
            changes.push(ServiceChange {
                file: change.file,
                status: change.status,
                service,
            });
        }
        Ok(changes)
    }

    /// Commit history of a definition's file, newest first
    pub fn history(&self, id: i64) -> RegistryResult<Vec<CommitInfo>> {
        let file = match self.find(id) {
            Some(service) => self.services.store().file_name(service),
            None => self
                .committed_file(id)?
                .ok_or(RegistryError::ServiceNotFound { id })?,
        };
        self.repository.history(&file)
    }

    /// Discard uncommitted changes to one definition and reload
    pub fn revert(&mut self, id: i64) -> RegistryResult<()> {
        let mut files: Vec<String> = self
            .services
            .store()
            .files_for_id(id)?
            .iter()
            .filter_map(|path| path.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();
        if let Some(committed) = self.committed_file(id)? {
            if !files.contains(&committed) {
                files.push(committed);
            }
        }

        if files.is_empty() {
            return Err(RegistryError::ServiceNotFound { id });
        }
        for file in &files {
            self.repository.revert_file(file)?;
        }
        self.load()?;
        Ok(())
    }

    /// Swap a definition with its neighbour in evaluation order
    ///
    /// Both definitions take their list positions as their new evaluation
    /// order. Returns `false` when the definition is already first (or last).
    pub fn reorder(&mut self, id: i64, direction: Direction) -> RegistryResult<bool> {
        let ordered = self.services();
        let index = ordered
            .iter()
            .position(|s| s.id == id)
            .ok_or(RegistryError::ServiceNotFound { id })?;

        let neighbour = match direction {
            Direction::Up if index > 0 => index - 1,
            Direction::Down if index + 1 < ordered.len() => index + 1,
            _ => return Ok(false),
        };

        let mut moved = ordered[index].clone();
        let mut other = ordered[neighbour].clone();
        moved.evaluation_order = neighbour as i32;
        other.evaluation_order = index as i32;
        self.save(moved)?;
        self.save(other)?;
        Ok(true)
    }

    /// Name of the committed record file holding `id`, if any
    fn committed_file(&self, id: i64) -> RegistryResult<Option<String>> {
        let naming = self.services.store().naming().clone();
        for file in self.repository.committed_files()? {
            if !naming.matches_id(&file, id) {
                continue;
            }
            let holds_id = self
                .repository
                .read_committed(&file)?
                .and_then(|bytes| serde_json::from_slice::<RegisteredService>(&bytes).ok())
                .is_some_and(|service| service.id == id);
            if holds_id {
                return Ok(Some(file));
            }
        }
        Ok(None)
    }
}

impl ServiceSource for VersionControlServicesManager {
    fn load_all(&self) -> RegistryResult<Vec<RegisteredService>> {
        Ok(self.services())
    }
}
