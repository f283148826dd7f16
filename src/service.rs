//! Async facade over the registry
//!
//! Every registry operation is blocking filesystem and libgit2 work, so each
//! call resolves the caller's manager and runs on the blocking pool.
//!
//! ```rust,ignore
//! let service = RegistryService::bootstrap(config, Box::new(Vec::new())).await?;
//! let session = SessionId::new("web-1");
//! let user = Principal::user("alice");
//!
//! service.save(&session, &user, definition).await?;
//! service.publish(&session, &user, "add portal").await?;
//! service.end_session(&session).await?;
//! ```

use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::git::CommitInfo;
use crate::principal::{Principal, SessionId};
use crate::registry::{Direction, ManagerFactory, RegistryAccess, ServiceChange};
use crate::services::{RegisteredService, ServiceSource};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Cloneable async handle to a bootstrapped registry
#[derive(Clone, Debug)]
pub struct RegistryService {
    factory: Arc<ManagerFactory>,
}

impl RegistryService {
    pub fn new(factory: Arc<ManagerFactory>) -> Self {
        Self { factory }
    }

    /// Run bootstrap on the blocking pool
    pub async fn bootstrap(
        config: RegistryConfig,
        existing: Box<dyn ServiceSource>,
    ) -> RegistryResult<Self> {
        let factory = tokio::task::spawn_blocking(move || {
            ManagerFactory::bootstrap(&config, existing.as_ref())
        })
        .await
        .map_err(|e| RegistryError::internal(format!("Task join error: {e}")))?;
        Ok(Self::new(Arc::new(factory)))
    }

    pub fn factory(&self) -> &ManagerFactory {
        &self.factory
    }

    async fn run<R, F>(&self, session: &SessionId, principal: &Principal, f: F) -> RegistryResult<R>
    where
        F: FnOnce(&RegistryAccess) -> RegistryResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let factory = self.factory.clone();
        let session = session.clone();
        let principal = principal.clone();

        tokio::task::spawn_blocking(move || {
            let access = factory.for_principal(&session, &principal)?;
            f(&access)
        })
        .await
        .map_err(|e| RegistryError::internal(format!("Task join error: {e}")))?
    }

    pub async fn list(
        &self,
        session: &SessionId,
        principal: &Principal,
    ) -> RegistryResult<Vec<RegisteredService>> {
        self.run(session, principal, |access| Ok(access.read(|m| m.services())))
            .await
    }

    pub async fn list_domain(
        &self,
        session: &SessionId,
        principal: &Principal,
        domain: &str,
    ) -> RegistryResult<Vec<RegisteredService>> {
        let domain = domain.to_string();
        self.run(session, principal, move |access| {
            Ok(access.read(|m| m.services_in_domain(&domain)))
        })
        .await
    }

    pub async fn domains(
        &self,
        session: &SessionId,
        principal: &Principal,
    ) -> RegistryResult<Vec<String>> {
        self.run(session, principal, |access| Ok(access.read(|m| m.domains())))
            .await
    }

    pub async fn find(
        &self,
        session: &SessionId,
        principal: &Principal,
        id: i64,
    ) -> RegistryResult<RegisteredService> {
        self.run(session, principal, move |access| {
            access
                .read(|m| m.find(id).cloned())
                .ok_or(RegistryError::ServiceNotFound { id })
        })
        .await
    }

    #[instrument(skip(self, service), fields(id = service.id))]
    pub async fn save(
        &self,
        session: &SessionId,
        principal: &Principal,
        service: RegisteredService,
    ) -> RegistryResult<()> {
        self.run(session, principal, move |access| access.write(|m| m.save(service)))
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        session: &SessionId,
        principal: &Principal,
        id: i64,
    ) -> RegistryResult<RegisteredService> {
        self.run(session, principal, move |access| access.write(|m| m.delete(id)))
            .await
    }

    /// Commit and publish; returns the new commit id, if one was made
    #[instrument(skip(self))]
    pub async fn publish(
        &self,
        session: &SessionId,
        principal: &Principal,
        message: &str,
    ) -> RegistryResult<Option<String>> {
        let message = message.to_string();
        let oid = self
            .run(session, principal, move |access| {
                access.write(|m| m.publish(&message))
            })
            .await?;
        debug!("Publish result: {:?}", oid);
        Ok(oid.map(|oid| oid.to_string()))
    }

    pub async fn changes(
        &self,
        session: &SessionId,
        principal: &Principal,
    ) -> RegistryResult<Vec<ServiceChange>> {
        self.run(session, principal, |access| access.read(|m| m.changes()))
            .await
    }

    pub async fn history(
        &self,
        session: &SessionId,
        principal: &Principal,
        id: i64,
    ) -> RegistryResult<Vec<CommitInfo>> {
        self.run(session, principal, move |access| access.read(|m| m.history(id)))
            .await
    }

    pub async fn revert(
        &self,
        session: &SessionId,
        principal: &Principal,
        id: i64,
    ) -> RegistryResult<()> {
        self.run(session, principal, move |access| access.write(|m| m.revert(id)))
            .await
    }

    pub async fn reorder(
        &self,
        session: &SessionId,
        principal: &Principal,
        id: i64,
        direction: Direction,
    ) -> RegistryResult<bool> {
        self.run(session, principal, move |access| {
            access.write(|m| m.reorder(id, direction))
        })
        .await
    }

    /// Drop the session's private manager
    pub async fn end_session(&self, session: &SessionId) -> RegistryResult<bool> {
        let factory = self.factory.clone();
        let session = session.clone();
        tokio::task::spawn_blocking(move || factory.end_session(&session))
            .await
            .map_err(|e| RegistryError::internal(format!("Task join error: {e}")))
    }
}
