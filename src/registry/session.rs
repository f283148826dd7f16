//! Session-scoped registry managers
//!
//! Each transport session owns at most one private manager. The entry keeps
//! the principal it was created for; handing the same session to another
//! principal is refused. Dropping the entry drops the manager and with it the
//! repository lease.

use super::manager::VersionControlServicesManager;
use crate::error::{RegistryError, RegistryResult};
use crate::principal::{Principal, SessionId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Manager shared between the requests of one session
pub type SessionManager = Arc<Mutex<VersionControlServicesManager>>;

struct SessionEntry {
    principal: Principal,
    manager: SessionManager,
}

/// Session id -> private registry manager
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager already attached to `session`, if any
    ///
    /// Fails when the session belongs to a different principal.
    pub fn get(
        &self,
        session: &SessionId,
        principal: &Principal,
    ) -> RegistryResult<Option<SessionManager>> {
        let sessions = self.sessions.read();
        match sessions.get(session) {
            Some(entry) if entry.principal.id() != principal.id() => Err(RegistryError::resolution(
                principal.id(),
                format!("session {} belongs to another principal", session),
            )),
            Some(entry) => Ok(Some(entry.manager.clone())),
            None => Ok(None),
        }
    }

    /// Manager for `session`, built with `create` on a miss
    ///
    /// The boolean is `true` when the manager was created by this call.
    pub fn get_or_create<F>(
        &self,
        session: &SessionId,
        principal: &Principal,
        create: F,
    ) -> RegistryResult<(SessionManager, bool)>
    where
        F: FnOnce() -> RegistryResult<VersionControlServicesManager>,
    {
        if let Some(manager) = self.get(session, principal)? {
            return Ok((manager, false));
        }

        // clone or open the repository before taking the table lock
        let built = create()?;

        let mut sessions = self.sessions.write();
        // another request on the same session may have won the race
        if let Some(entry) = sessions.get(session) {
            if entry.principal.id() != principal.id() {
                return Err(RegistryError::resolution(
                    principal.id(),
                    format!("session {} belongs to another principal", session),
                ));
            }
            return Ok((entry.manager.clone(), false));
        }

        let manager = Arc::new(Mutex::new(built));
        sessions.insert(
            session.clone(),
            SessionEntry {
                principal: principal.clone(),
                manager: manager.clone(),
            },
        );
        debug!("Attached registry manager for {} to session {}", principal, session);
        Ok((manager, true))
    }

    /// Discard the session's manager; returns whether one was attached
    ///
    /// The repository lease is released once the last clone of the manager
    /// handle is dropped.
    pub fn end_session(&self, session: &SessionId) -> bool {
        let removed = self.sessions.write().remove(session);
        match removed {
            Some(entry) => {
                info!("Ended session {} of {}", session, entry.principal);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ManagementType, RegistryConfig};
    use crate::git::RepositoryFactory;
    use crate::services::DefaultNamingStrategy;
    use tempfile::TempDir;

    fn build(
        factory: &RepositoryFactory,
        principal: &Principal,
    ) -> RegistryResult<VersionControlServicesManager> {
        VersionControlServicesManager::new(
            factory.repository_for(principal)?,
            ManagementType::Default,
            Arc::new(DefaultNamingStrategy),
        )
    }

    #[test]
    fn test_create_on_miss_then_reuse() {
        let temp_dir = TempDir::new().unwrap();
        let factory = RepositoryFactory::new(&RegistryConfig::rooted_at(temp_dir.path()));
        let store = SessionStore::new();
        let alice = Principal::user("alice");
        let session = SessionId::new("s1");

        let (first, created) = store
            .get_or_create(&session, &alice, || build(&factory, &alice))
            .unwrap();
        assert!(created);

        let (second, created) = store
            .get_or_create(&session, &alice, || panic!("must reuse"))
            .unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_session_not_shared_across_principals() {
        let temp_dir = TempDir::new().unwrap();
        let factory = RepositoryFactory::new(&RegistryConfig::rooted_at(temp_dir.path()));
        let store = SessionStore::new();
        let alice = Principal::user("alice");
        let mallory = Principal::user("mallory");
        let session = SessionId::new("shared");

        store
            .get_or_create(&session, &alice, || build(&factory, &alice))
            .unwrap();
        let err = store
            .get_or_create(&session, &mallory, || build(&factory, &mallory))
            .unwrap_err();
        assert!(matches!(err, RegistryError::RepositoryResolution { .. }));
    }

    #[test]
    fn test_end_session_releases_lease() {
        let temp_dir = TempDir::new().unwrap();
        let factory = RepositoryFactory::new(&RegistryConfig::rooted_at(temp_dir.path()));
        let store = SessionStore::new();
        let alice = Principal::user("alice");
        let session = SessionId::new("s1");

        store
            .get_or_create(&session, &alice, || build(&factory, &alice))
            .unwrap();
        assert_eq!(factory.active_leases(), 1);

        assert!(store.end_session(&session));
        assert_eq!(factory.active_leases(), 0);
        assert!(store.is_empty());
        assert!(!store.end_session(&session));
    }

    #[test]
    fn test_other_sessions_usable_while_one_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let factory = RepositoryFactory::new(&RegistryConfig::rooted_at(temp_dir.path()));
        let store = SessionStore::new();
        let alice = Principal::user("alice");
        let bob = Principal::user("bob");
        let existing = SessionId::new("bob-1");

        store
            .get_or_create(&existing, &bob, || build(&factory, &bob))
            .unwrap();

        let (_, created) = store
            .get_or_create(&SessionId::new("alice-1"), &alice, || {
                // the table must not be locked while a manager is built
                assert!(store.get(&existing, &bob).unwrap().is_some());
                assert_eq!(store.len(), 1);
                build(&factory, &alice)
            })
            .unwrap();
        assert!(created);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_failed_create_leaves_no_entry() {
        let store = SessionStore::new();
        let alice = Principal::user("alice");
        let session = SessionId::new("s1");

        let result = store.get_or_create(&session, &alice, || {
            Err(RegistryError::resolution("alice", "boom"))
        });
        assert!(result.is_err());
        assert!(store.is_empty());
    }
}
