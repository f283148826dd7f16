//! In-memory services registries
//!
//! Two layouts sit behind [`ServicesManager`]: a flat map keyed by id, and a
//! map partitioned by the host of each service URL pattern. Both persist
//! through a [`JsonServiceStore`]; which one is used is a configuration choice.

use super::store::{JsonServiceStore, ServiceSource};
use super::RegisteredService;
use crate::config::ManagementType;
use crate::error::RegistryResult;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// In-memory view of a service registry backed by a record store
pub trait ServicesManager: Send + Sync {
    /// Record store this manager persists through
    fn store(&self) -> &JsonServiceStore;

    /// Replace the in-memory state with what is on disk; returns the count loaded
    fn load(&mut self) -> RegistryResult<usize>;

    /// Persist a definition and index it, replacing any with the same id
    fn save(&mut self, service: RegisteredService) -> RegistryResult<()>;

    /// Remove a definition from disk and memory
    fn delete(&mut self, id: i64) -> RegistryResult<Option<RegisteredService>>;

    fn find(&self, id: i64) -> Option<&RegisteredService>;

    /// All definitions ordered by evaluation order, then id
    fn services(&self) -> Vec<RegisteredService>;

    /// Domains with at least one definition, sorted
    fn domains(&self) -> Vec<String>;

    /// Definitions of one domain ordered by evaluation order, then id
    fn services_in_domain(&self, domain: &str) -> Vec<RegisteredService>;

    fn count(&self) -> usize;
}

/// Build the manager variant selected by configuration
pub fn create_services_manager(
    management_type: ManagementType,
    store: JsonServiceStore,
) -> Box<dyn ServicesManager> {
    match management_type {
        ManagementType::Default => Box::new(DefaultServicesManager::new(store)),
        ManagementType::Domain => Box::new(DomainServicesManager::new(store)),
    }
}

fn sorted(mut services: Vec<RegisteredService>) -> Vec<RegisteredService> {
    services.sort_by_key(|s| (s.evaluation_order, s.id));
    services
}

/// Flat registry keyed by service id
#[derive(Debug)]
pub struct DefaultServicesManager {
    store: JsonServiceStore,
    services: BTreeMap<i64, RegisteredService>,
}

impl DefaultServicesManager {
    pub fn new(store: JsonServiceStore) -> Self {
        Self {
            store,
            services: BTreeMap::new(),
        }
    }
}

impl ServicesManager for DefaultServicesManager {
    fn store(&self) -> &JsonServiceStore {
        &self.store
    }

    fn load(&mut self) -> RegistryResult<usize> {
        let loaded = self.store.load_all()?;
        self.services = loaded.into_iter().map(|s| (s.id, s)).collect();
        debug!("Loaded {} services from {:?}", self.services.len(), self.store.path());
        Ok(self.services.len())
    }

    fn save(&mut self, service: RegisteredService) -> RegistryResult<()> {
        self.store.save(&service)?;
        self.services.insert(service.id, service);
        Ok(())
    }

    fn delete(&mut self, id: i64) -> RegistryResult<Option<RegisteredService>> {
        self.store.remove(id)?;
        Ok(self.services.remove(&id))
    }

    fn find(&self, id: i64) -> Option<&RegisteredService> {
        self.services.get(&id)
    }

    fn services(&self) -> Vec<RegisteredService> {
        sorted(self.services.values().cloned().collect())
    }

    fn domains(&self) -> Vec<String> {
        self.services
            .values()
            .map(RegisteredService::domain)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn services_in_domain(&self, domain: &str) -> Vec<RegisteredService> {
        let domain = domain.to_ascii_lowercase();
        sorted(
            self.services
                .values()
                .filter(|s| s.domain() == domain)
                .cloned()
                .collect(),
        )
    }

    fn count(&self) -> usize {
        self.services.len()
    }
}

impl ServiceSource for DefaultServicesManager {
    fn load_all(&self) -> RegistryResult<Vec<RegisteredService>> {
        Ok(self.services())
    }
}

/// Registry partitioned by service domain
#[derive(Debug)]
pub struct DomainServicesManager {
    store: JsonServiceStore,
    domains: HashMap<String, BTreeMap<i64, RegisteredService>>,
    /// service id -> domain it is filed under
    index: HashMap<i64, String>,
}

impl DomainServicesManager {
    pub fn new(store: JsonServiceStore) -> Self {
        Self {
            store,
            domains: HashMap::new(),
            index: HashMap::new(),
        }
    }

    fn insert(&mut self, service: RegisteredService) {
        self.unindex(service.id);
        let domain = service.domain();
        self.index.insert(service.id, domain.clone());
        self.domains
            .entry(domain)
            .or_default()
            .insert(service.id, service);
    }

    fn unindex(&mut self, id: i64) -> Option<RegisteredService> {
        let domain = self.index.remove(&id)?;
        let partition = self.domains.get_mut(&domain)?;
        let removed = partition.remove(&id);
        if partition.is_empty() {
            self.domains.remove(&domain);
        }
        removed
    }
}

impl ServicesManager for DomainServicesManager {
    fn store(&self) -> &JsonServiceStore {
        &self.store
    }

    fn load(&mut self) -> RegistryResult<usize> {
        let loaded = self.store.load_all()?;
        self.domains.clear();
        self.index.clear();
        for service in loaded {
            self.insert(service);
        }
        debug!(
            "Loaded {} services in {} domains from {:?}",
            self.index.len(),
            self.domains.len(),
            self.store.path()
        );
        Ok(self.index.len())
    }

    fn save(&mut self, service: RegisteredService) -> RegistryResult<()> {
        self.store.save(&service)?;
        self.insert(service);
        Ok(())
    }

    fn delete(&mut self, id: i64) -> RegistryResult<Option<RegisteredService>> {
        self.store.remove(id)?;
        Ok(self.unindex(id))
    }

    fn find(&self, id: i64) -> Option<&RegisteredService> {
        let domain = self.index.get(&id)?;
        self.domains.get(domain)?.get(&id)
    }

    fn services(&self) -> Vec<RegisteredService> {
        sorted(
            self.domains
                .values()
                .flat_map(|partition| partition.values().cloned())
                .collect(),
        )
    }

    fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.domains.keys().cloned().collect();
        domains.sort();
        domains
    }

    fn services_in_domain(&self, domain: &str) -> Vec<RegisteredService> {
        self.domains
            .get(&domain.to_ascii_lowercase())
            .map(|partition| sorted(partition.values().cloned().collect()))
            .unwrap_or_default()
    }

    fn count(&self) -> usize {
        self.index.len()
    }
}

impl ServiceSource for DomainServicesManager {
    fn load_all(&self) -> RegistryResult<Vec<RegisteredService>> {
        Ok(self.services())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::naming::DefaultNamingStrategy;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store(dir: &Path) -> JsonServiceStore {
        JsonServiceStore::new(dir, Arc::new(DefaultNamingStrategy))
    }

    fn sample() -> Vec<RegisteredService> {
        vec![
            RegisteredService::new(1, "Portal", "^https://portal\\.example\\.org/.*")
                .with_evaluation_order(2),
            RegisteredService::new(2, "Mail", "https://mail.example.org/login")
                .with_evaluation_order(1),
            RegisteredService::new(3, "Wiki", "https://wiki.other.net/"),
        ]
    }

    #[test]
    fn test_both_variants_agree() {
        for management_type in [ManagementType::Default, ManagementType::Domain] {
            let temp_dir = TempDir::new().unwrap();
            let mut manager = create_services_manager(management_type, store(temp_dir.path()));
            for service in sample() {
                manager.save(service).unwrap();
            }

            let mut reloaded = create_services_manager(management_type, store(temp_dir.path()));
            assert_eq!(reloaded.load().unwrap(), 3);

            let order: Vec<i64> = reloaded.services().iter().map(|s| s.id).collect();
            assert_eq!(order, vec![3, 2, 1], "{:?}", management_type);
            assert_eq!(
                reloaded.domains(),
                vec!["mail.example.org", "portal.example.org", "wiki.other.net"]
            );
            assert_eq!(reloaded.services_in_domain("MAIL.example.org").len(), 1);
        }
    }

    #[test]
    fn test_domain_manager_moves_service_between_partitions() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = DomainServicesManager::new(store(temp_dir.path()));
        let mut service = RegisteredService::new(9, "Moving", "https://a.example.org/");
        manager.save(service.clone()).unwrap();

        service.service_id = "https://b.example.org/".to_string();
        manager.save(service).unwrap();

        assert_eq!(manager.domains(), vec!["b.example.org"]);
        assert!(manager.services_in_domain("a.example.org").is_empty());
        assert_eq!(manager.count(), 1);
    }

    #[test]
    fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = DomainServicesManager::new(store(temp_dir.path()));
        for service in sample() {
            manager.save(service).unwrap();
        }

        let removed = manager.delete(3).unwrap();
        assert_eq!(removed.map(|s| s.name), Some("Wiki".to_string()));
        assert!(manager.find(3).is_none());
        assert!(!manager.domains().contains(&"wiki.other.net".to_string()));
        assert_eq!(manager.delete(3).unwrap(), None);
    }

    #[test]
    fn test_load_discards_in_memory_only_state() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = DefaultServicesManager::new(store(temp_dir.path()));
        manager.save(RegisteredService::new(1, "a", "https://a.org")).unwrap();

        std::fs::remove_file(temp_dir.path().join("a-1.json")).unwrap();
        assert_eq!(manager.load().unwrap(), 0);
        assert!(manager.find(1).is_none());
    }
}
