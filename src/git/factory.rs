//! Repository resolution per principal
//!
//! Administrators share the master repository. Every other principal gets a
//! private clone of master under `repos_dir`, created on first access and
//! handed out as a lease that is released when the handle drops. Handles to
//! the same private directory share one workspace lock, so index and working
//! tree updates from concurrent sessions of a principal never interleave.

use super::repository::GitRepository;
use crate::config::{CommitSignature, RegistryConfig};
use crate::error::{RegistryError, RegistryResult};
use crate::principal::Principal;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

type LeaseTable = Arc<Mutex<HashMap<PathBuf, usize>>>;

/// Exclusive access to one working directory
pub type WorkspaceLock = Arc<Mutex<()>>;

/// Resolves the repository a principal works against
pub struct RepositoryFactory {
    master_path: PathBuf,
    repos_dir: PathBuf,
    signature: CommitSignature,
    master: Mutex<Option<Arc<GitRepository>>>,
    leases: LeaseTable,
    workspaces: Mutex<HashMap<PathBuf, Weak<Mutex<()>>>>,
}

impl RepositoryFactory {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            master_path: config.version_control.services_repo.clone(),
            repos_dir: config.version_control.repos_dir.clone(),
            signature: config.signature.clone(),
            master: Mutex::new(None),
            leases: Arc::new(Mutex::new(HashMap::new())),
            workspaces: Mutex::new(HashMap::new()),
        }
    }

    pub fn master_path(&self) -> &Path {
        &self.master_path
    }

    pub fn signature(&self) -> &CommitSignature {
        &self.signature
    }

    /// Shared handle to the master repository, initialized on first call
    pub fn master_repository(&self) -> RegistryResult<Arc<GitRepository>> {
        let mut master = self.master.lock();
        if let Some(repo) = master.as_ref() {
            return Ok(repo.clone());
        }

        let repo = Arc::new(GitRepository::open(&self.master_path, self.signature.clone())?);
        *master = Some(repo.clone());
        Ok(repo)
    }

    /// Location of a principal's private repository
    pub fn private_path(&self, principal: &Principal) -> RegistryResult<PathBuf> {
        let key = principal.repository_key().ok_or_else(|| {
            RegistryError::resolution(principal.id(), "Principal id cannot name a repository")
        })?;
        Ok(self.repos_dir.join(key))
    }

    /// Lock shared by every live handle to the directory at `path`
    fn workspace_lock(&self, path: &Path) -> WorkspaceLock {
        let mut workspaces = self.workspaces.lock();
        if let Some(lock) = workspaces.get(path).and_then(Weak::upgrade) {
            return lock;
        }

        workspaces.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(Mutex::new(()));
        workspaces.insert(path.to_path_buf(), Arc::downgrade(&lock));
        lock
    }

    /// Repository for `principal`: master for administrators, a private lease otherwise
    pub fn repository_for(&self, principal: &Principal) -> RegistryResult<RepositoryHandle> {
        if principal.uses_master() {
            return Ok(RepositoryHandle::Master(self.master_repository()?));
        }

        let path = self.private_path(principal)?;
        let workspace = self.workspace_lock(&path);
        let guard = workspace.lock();

        let repo = if GitRepository::exists(&path) {
            GitRepository::open(&path, self.signature.clone())
                .map_err(|e| RegistryError::resolution(principal.id(), e.to_string()))?
        } else {
            let master = self
                .master_repository()
                .map_err(|e| RegistryError::resolution(principal.id(), e.to_string()))?;
            info!("Creating private repository for {} at {:?}", principal, path);
            GitRepository::clone_from(&master, &path, self.signature.clone())
                .map_err(|e| RegistryError::resolution(principal.id(), e.to_string()))?
        };

        drop(guard);

        *self.leases.lock().entry(path.clone()).or_insert(0) += 1;
        debug!("Leased {:?} to {}", path, principal);

        Ok(RepositoryHandle::Private(PrivateRepository {
            repo,
            owner: principal.id().to_string(),
            leases: self.leases.clone(),
            workspace,
        }))
    }

    /// Number of private handles currently held
    pub fn active_leases(&self) -> usize {
        self.leases.lock().values().sum()
    }
}

/// Repository a registry manager is bound to
pub enum RepositoryHandle {
    Master(Arc<GitRepository>),
    Private(PrivateRepository),
}

impl RepositoryHandle {
    pub fn is_master(&self) -> bool {
        matches!(self, Self::Master(_))
    }

    /// Lock guarding a private working directory; master is guarded by its manager
    pub fn workspace_lock(&self) -> Option<WorkspaceLock> {
        match self {
            Self::Master(_) => None,
            Self::Private(private) => Some(private.workspace.clone()),
        }
    }
}

impl Deref for RepositoryHandle {
    type Target = GitRepository;

    fn deref(&self) -> &GitRepository {
        match self {
            Self::Master(repo) => repo.as_ref(),
            Self::Private(private) => &private.repo,
        }
    }
}

impl std::fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Master(repo) => f.debug_tuple("Master").field(&repo.path()).finish(),
            Self::Private(private) => f
                .debug_struct("Private")
                .field("owner", &private.owner)
                .field("path", &private.repo.path())
                .finish(),
        }
    }
}

/// Leased private repository; the lease is returned on drop
pub struct PrivateRepository {
    repo: GitRepository,
    owner: String,
    leases: LeaseTable,
    workspace: WorkspaceLock,
}

impl PrivateRepository {
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Drop for PrivateRepository {
    fn drop(&mut self) {
        let mut leases = self.leases.lock();
        let path = self.repo.path().to_path_buf();
        if let Some(count) = leases.get_mut(&path) {
            *count -= 1;
            if *count == 0 {
                leases.remove(&path);
            }
        }
        debug!("Released {:?} held by {}", path, self.owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_admin_gets_master() {
        let temp_dir = TempDir::new().unwrap();
        let factory = RepositoryFactory::new(&RegistryConfig::rooted_at(temp_dir.path()));

        let handle = factory
            .repository_for(&Principal::administrator("casadmin"))
            .unwrap();
        assert!(handle.is_master());
        assert_eq!(handle.path(), factory.master_path());
        assert_eq!(factory.active_leases(), 0);
    }

    #[test]
    fn test_private_repositories_are_isolated_and_stable() {
        let temp_dir = TempDir::new().unwrap();
        let factory = RepositoryFactory::new(&RegistryConfig::rooted_at(temp_dir.path()));

        let alice = factory.repository_for(&Principal::user("alice")).unwrap();
        let bob = factory.repository_for(&Principal::user("bob")).unwrap();
        assert!(!alice.is_master());
        assert_ne!(alice.path(), bob.path());
        assert_ne!(alice.path(), factory.master_path());

        let alice_path = alice.path().to_path_buf();
        drop(alice);
        let again = factory.repository_for(&Principal::user("alice")).unwrap();
        assert_eq!(again.path(), alice_path);
    }

    #[test]
    fn test_lease_released_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let factory = RepositoryFactory::new(&RegistryConfig::rooted_at(temp_dir.path()));

        let first = factory.repository_for(&Principal::user("carol")).unwrap();
        let second = factory.repository_for(&Principal::user("carol")).unwrap();
        assert_eq!(factory.active_leases(), 2);

        drop(first);
        assert_eq!(factory.active_leases(), 1);
        drop(second);
        assert_eq!(factory.active_leases(), 0);
    }

    #[test]
    fn test_handles_to_one_directory_share_workspace_lock() {
        let temp_dir = TempDir::new().unwrap();
        let factory = RepositoryFactory::new(&RegistryConfig::rooted_at(temp_dir.path()));

        let first = factory.repository_for(&Principal::user("dave")).unwrap();
        let second = factory.repository_for(&Principal::user("dave")).unwrap();
        let other = factory.repository_for(&Principal::user("erin")).unwrap();

        let lock = first.workspace_lock().unwrap();
        assert!(Arc::ptr_eq(&lock, &second.workspace_lock().unwrap()));
        assert!(!Arc::ptr_eq(&lock, &other.workspace_lock().unwrap()));

        let master = factory
            .repository_for(&Principal::administrator("root"))
            .unwrap();
        assert!(master.workspace_lock().is_none());
    }

    #[test]
    fn test_concurrent_first_access_clones_once() {
        let temp_dir = TempDir::new().unwrap();
        let factory = RepositoryFactory::new(&RegistryConfig::rooted_at(temp_dir.path()));
        let frank = Principal::user("frank");

        let paths: Vec<PathBuf> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| factory.repository_for(&frank).map(|h| h.path().to_path_buf())))
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap().unwrap())
                .collect()
        });

        assert!(paths.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(factory.active_leases(), 0);
    }

    #[test]
    fn test_unmappable_principal() {
        let temp_dir = TempDir::new().unwrap();
        let factory = RepositoryFactory::new(&RegistryConfig::rooted_at(temp_dir.path()));

        let err = factory.repository_for(&Principal::user("")).unwrap_err();
        assert!(matches!(err, RegistryError::RepositoryResolution { .. }));
    }
}
