//! Bootstrap and manager resolution
//!
//! [`ManagerFactory::bootstrap`] runs once per process. It either opens the
//! master repository or creates and seeds it, then builds the long-lived
//! master manager. When master cannot be created the factory stays
//! [`BootstrapState::Degraded`] and refuses every request with
//! [`RegistryError::VersionControlUnavailable`].

use super::manager::VersionControlServicesManager;
use super::session::{SessionManager, SessionStore};
use crate::config::{ManagementType, RegistryConfig};
use crate::error::{RegistryError, RegistryResult};
use crate::git::{GitRepository, RepositoryFactory, RepositoryHandle};
use crate::principal::{Principal, SessionId};
use crate::services::{DefaultNamingStrategy, NamingStrategy, ServiceSource};
use git2::Oid;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Message of the commit holding the imported registry
pub const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

/// Master manager shared by every administrator
pub type MasterManager = Arc<RwLock<VersionControlServicesManager>>;

/// Outcome of bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Ready,
    /// Master could not be created; version control is disabled
    Degraded,
}

/// Manager handed to a caller for one request
#[derive(Clone)]
pub enum RegistryAccess {
    Master(MasterManager),
    Session(SessionManager),
}

impl RegistryAccess {
    pub fn is_master(&self) -> bool {
        matches!(self, Self::Master(_))
    }

    /// Run a read-only operation; master reads may run concurrently
    pub fn read<R>(&self, f: impl FnOnce(&VersionControlServicesManager) -> R) -> R {
        match self {
            Self::Master(manager) => f(&manager.read()),
            Self::Session(manager) => {
                let workspace = manager.lock().workspace_lock();
                let _guard = workspace.as_ref().map(|lock| lock.lock());
                f(&manager.lock())
            }
        }
    }

    /// Run a mutating operation under the manager's exclusive lock
    ///
    /// Session managers additionally hold the lock of their working
    /// directory, which other sessions of the same principal share.
    pub fn write<R>(&self, f: impl FnOnce(&mut VersionControlServicesManager) -> R) -> R {
        match self {
            Self::Master(manager) => f(&mut manager.write()),
            Self::Session(manager) => {
                let workspace = manager.lock().workspace_lock();
                let _guard = workspace.as_ref().map(|lock| lock.lock());
                f(&mut manager.lock())
            }
        }
    }
}

impl std::fmt::Debug for RegistryAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Master(_) => f.write_str("RegistryAccess::Master"),
            Self::Session(_) => f.write_str("RegistryAccess::Session"),
        }
    }
}

/// Process-wide entry point to the version-controlled registry
pub struct ManagerFactory {
    repositories: RepositoryFactory,
    management_type: ManagementType,
    naming: Arc<dyn NamingStrategy>,
    master: Option<MasterManager>,
    sessions: SessionStore,
}

impl ManagerFactory {
    /// Bootstrap with the default file naming
    pub fn bootstrap(config: &RegistryConfig, existing: &dyn ServiceSource) -> Self {
        Self::bootstrap_with_naming(config, existing, Arc::new(DefaultNamingStrategy))
    }

    /// Open or create master, seed it on creation and build the master manager
    ///
    /// Never fails: anything that prevents a usable master leaves the factory
    /// degraded.
    pub fn bootstrap_with_naming(
        config: &RegistryConfig,
        existing: &dyn ServiceSource,
        naming: Arc<dyn NamingStrategy>,
    ) -> Self {
        let repositories = RepositoryFactory::new(config);
        let mut factory = Self {
            repositories,
            management_type: config.registry.management_type,
            naming,
            master: None,
            sessions: SessionStore::new(),
        };

        let master_path = factory.repositories.master_path().to_path_buf();
        if GitRepository::exists(&master_path) {
            info!("Using existing services repository at {:?}", master_path);
        } else {
            info!("Creating services repository at {:?}", master_path);
            let repo = match GitRepository::init(&master_path, factory.repositories.signature().clone()) {
                Ok(repo) => repo,
                Err(e) => {
                    error!("Version control disabled, cannot create services repository: {}", e);
                    return factory;
                }
            };

            match factory.seed(repo, existing) {
                Ok(Some(oid)) => info!("Seeded services repository with commit {}", oid),
                Ok(None) => info!("No existing services to seed"),
                Err(e) => error!("{}", e),
            }
        }

        match factory.build_master() {
            Ok(manager) => {
                info!(
                    "Registry ready with {} services in master",
                    manager.count()
                );
                factory.master = Some(Arc::new(RwLock::new(manager)));
            }
            Err(e) => error!("Version control disabled, cannot load master registry: {}", e),
        }
        factory
    }

    /// Import `existing` into a fresh master and commit it as the initial state
    fn seed(
        &self,
        repo: GitRepository,
        existing: &dyn ServiceSource,
    ) -> RegistryResult<Option<Oid>> {
        let seed = || -> RegistryResult<Option<Oid>> {
            let mut manager = VersionControlServicesManager::new(
                RepositoryHandle::Master(Arc::new(repo)),
                self.management_type,
                self.naming.clone(),
            )?;
            manager.load_from(existing)?;
            manager.publish(INITIAL_COMMIT_MESSAGE)
        };
        seed().map_err(|e| RegistryError::seeding(e.to_string()))
    }

    fn build_master(&self) -> RegistryResult<VersionControlServicesManager> {
        VersionControlServicesManager::new(
            RepositoryHandle::Master(self.repositories.master_repository()?),
            self.management_type,
            self.naming.clone(),
        )
    }

    pub fn state(&self) -> BootstrapState {
        if self.master.is_some() {
            BootstrapState::Ready
        } else {
            BootstrapState::Degraded
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == BootstrapState::Ready
    }

    /// The master manager, absent when degraded
    pub fn master(&self) -> Option<MasterManager> {
        self.master.clone()
    }

    pub fn repositories(&self) -> &RepositoryFactory {
        &self.repositories
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Manager `principal` works with during `session`
    ///
    /// Administrators share the master manager, reloaded from the master
    /// working directory on every call. Other principals get the session's
    /// private manager, created on first use and reloaded on every later call.
    pub fn for_principal(
        &self,
        session: &SessionId,
        principal: &Principal,
    ) -> RegistryResult<RegistryAccess> {
        let master = self
            .master
            .as_ref()
            .ok_or(RegistryError::VersionControlUnavailable)?;

        if principal.uses_master() {
            let count = master.write().load()?;
            debug!("{} works against master with {} services", principal, count);
            return Ok(RegistryAccess::Master(master.clone()));
        }

        let (manager, created) = self.sessions.get_or_create(session, principal, || {
            let handle = self.repositories.repository_for(principal)?;
            VersionControlServicesManager::new(handle, self.management_type, self.naming.clone())
        })?;

        let access = RegistryAccess::Session(manager);
        if !created {
            let count = access.write(|m| m.load())?;
            debug!("Reloaded {} services for {} in session {}", count, principal, session);
        }
        Ok(access)
    }

    /// Drop the session's private manager and release its repository
    pub fn end_session(&self, session: &SessionId) -> bool {
        let ended = self.sessions.end_session(session);
        if !ended {
            warn!("No registry manager attached to session {}", session);
        }
        ended
    }
}

impl std::fmt::Debug for ManagerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerFactory")
            .field("master_path", &self.repositories.master_path())
            .field("management_type", &self.management_type)
            .field("state", &self.state())
            .field("sessions", &self.sessions)
            .finish()
    }
}
