//! Integration tests for the version-controlled registry
//!
//! Exercises bootstrap, per-user isolation and publishing end to end against
//! real git repositories in temporary directories.

use regvault_core::git::CREATED_MESSAGE;
use regvault_core::registry::{BootstrapState, ManagerFactory, INITIAL_COMMIT_MESSAGE};
use regvault_core::services::{DefaultNamingStrategy, JsonServiceStore};
use regvault_core::{Principal, RegisteredService, RegistryConfig, SessionId};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;

/// Helper to setup logging for tests
fn setup_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn definition(id: i64, name: &str) -> RegisteredService {
    RegisteredService::new(id, name, format!("^https://{}\\.example\\.org/.*", name))
}

fn ids(services: &[RegisteredService]) -> BTreeSet<i64> {
    services.iter().map(|s| s.id).collect()
}

#[test]
fn test_concrete_scenario() {
    setup_logging();
    let temp_dir = TempDir::new().unwrap();
    let config = RegistryConfig::rooted_at(temp_dir.path());
    let existing = vec![definition(1, "portal"), definition(2, "mail")];

    let factory = ManagerFactory::bootstrap(&config, &existing);
    assert_eq!(factory.state(), BootstrapState::Ready);

    let master = factory.master().unwrap();
    {
        let master = master.read();
        assert_eq!(
            master.repository().commit_messages().unwrap(),
            vec![INITIAL_COMMIT_MESSAGE, CREATED_MESSAGE]
        );
        assert_eq!(master.repository().committed_files().unwrap().len(), 2);
    }
    master.write().load().unwrap();
    assert_eq!(ids(&master.read().services()), BTreeSet::from([1, 2]));

    let user = Principal::user("u");
    let session = SessionId::new("u-session");
    let access = factory.for_principal(&session, &user).unwrap();
    assert!(!access.is_master());
    assert_eq!(access.read(|m| ids(&m.services())), BTreeSet::from([1, 2]));

    access.write(|m| m.save(definition(3, "wiki"))).unwrap();
    let commit = access.write(|m| m.publish("add 3")).unwrap();
    assert!(commit.is_some());
    assert_eq!(
        access.read(|m| m.repository().commit_messages().unwrap()[0].clone()),
        "add 3"
    );

    master.write().load().unwrap();
    assert_eq!(ids(&master.read().services()), BTreeSet::from([1, 2]));
}

#[test]
fn test_bootstrap_is_idempotent() {
    setup_logging();
    let temp_dir = TempDir::new().unwrap();
    let config = RegistryConfig::rooted_at(temp_dir.path());
    let existing = vec![definition(1, "portal"), definition(2, "mail")];

    let first = ManagerFactory::bootstrap(&config, &existing);
    let count = first.master().unwrap().read().repository().commit_count().unwrap();
    drop(first);

    // a different source on the second run must not be imported
    let second = ManagerFactory::bootstrap(&config, &vec![definition(9, "other")]);
    assert_eq!(second.state(), BootstrapState::Ready);
    let master = second.master().unwrap();
    let master = master.read();
    assert_eq!(master.repository().commit_count().unwrap(), count);
    assert_eq!(ids(&master.services()), BTreeSet::from([1, 2]));
}

#[test]
fn test_degraded_when_master_path_is_occupied() {
    setup_logging();
    let temp_dir = TempDir::new().unwrap();
    let config = RegistryConfig::rooted_at(temp_dir.path());
    let master_path = &config.version_control.services_repo;
    std::fs::create_dir_all(master_path).unwrap();
    std::fs::write(master_path.join("unrelated.txt"), "keep me").unwrap();

    let factory = ManagerFactory::bootstrap(&config, &vec![definition(1, "portal")]);
    assert_eq!(factory.state(), BootstrapState::Degraded);
    assert!(factory.master().is_none());
    assert!(factory
        .for_principal(&SessionId::new("s"), &Principal::user("u"))
        .unwrap_err()
        .is_unavailable());
    assert_eq!(
        std::fs::read_to_string(master_path.join("unrelated.txt")).unwrap(),
        "keep me"
    );
}

#[test]
fn test_users_are_isolated() {
    setup_logging();
    let temp_dir = TempDir::new().unwrap();
    let config = RegistryConfig::rooted_at(temp_dir.path());
    let factory = ManagerFactory::bootstrap(&config, &vec![definition(1, "portal")]);

    let a = factory
        .for_principal(&SessionId::new("a"), &Principal::user("alice"))
        .unwrap();
    let b = factory
        .for_principal(&SessionId::new("b"), &Principal::user("bob"))
        .unwrap();
    assert_ne!(
        a.read(|m| m.repository().path().to_path_buf()),
        b.read(|m| m.repository().path().to_path_buf())
    );

    a.write(|m| m.save(definition(2, "mail"))).unwrap();
    a.write(|m| m.publish("add mail")).unwrap();

    let b = factory
        .for_principal(&SessionId::new("b"), &Principal::user("bob"))
        .unwrap();
    assert_eq!(b.read(|m| ids(&m.services())), BTreeSet::from([1]));
}

#[test]
fn test_private_repository_survives_sessions() {
    setup_logging();
    let temp_dir = TempDir::new().unwrap();
    let config = RegistryConfig::rooted_at(temp_dir.path());
    let factory = ManagerFactory::bootstrap(&config, &vec![definition(1, "portal")]);
    let alice = Principal::user("alice");

    let first = SessionId::new("first");
    let access = factory.for_principal(&first, &alice).unwrap();
    access.write(|m| m.save(definition(2, "mail"))).unwrap();
    drop(access);
    assert_eq!(factory.repositories().active_leases(), 1);
    assert!(factory.end_session(&first));
    assert_eq!(factory.repositories().active_leases(), 0);

    // unpublished work is still in the working copy next session
    let access = factory.for_principal(&SessionId::new("second"), &alice).unwrap();
    assert_eq!(access.read(|m| ids(&m.services())), BTreeSet::from([1, 2]));
}

#[test]
fn test_administrators_share_master() {
    setup_logging();
    let temp_dir = TempDir::new().unwrap();
    let config = RegistryConfig::rooted_at(temp_dir.path());
    let factory = ManagerFactory::bootstrap(&config, &Vec::<RegisteredService>::new());

    let one = factory
        .for_principal(&SessionId::new("1"), &Principal::administrator("root"))
        .unwrap();
    let two = factory
        .for_principal(&SessionId::new("2"), &Principal::administrator("ops"))
        .unwrap();
    assert!(one.is_master() && two.is_master());

    one.write(|m| m.save(definition(5, "shared"))).unwrap();
    assert!(two.read(|m| m.find(5).is_some()));
    assert!(factory.sessions().is_empty());
}

#[test]
fn test_seeding_from_json_directory() {
    setup_logging();
    let temp_dir = TempDir::new().unwrap();
    let legacy = temp_dir.path().join("legacy");
    std::fs::create_dir_all(&legacy).unwrap();

    // records written by another tool, with fields this crate does not model
    for (id, name) in [(10, "Portal"), (11, "Mail"), (12, "Wiki")] {
        let record = json!({
            "@class": "org.example.RegexRegisteredService",
            "id": id,
            "name": name,
            "serviceId": format!("https://{}.example.org/.*", name.to_lowercase()),
            "evaluationOrder": id,
        });
        std::fs::write(
            legacy.join(format!("{}-{}.json", name, id)),
            serde_json::to_string_pretty(&record).unwrap(),
        )
        .unwrap();
    }

    let mut config = RegistryConfig::rooted_at(temp_dir.path());
    config.registry.source_dir = Some(legacy.clone());
    let source = JsonServiceStore::new(&legacy, Arc::new(DefaultNamingStrategy));

    let factory = ManagerFactory::bootstrap(&config, &source);
    let master = factory.master().unwrap();
    let master = master.read();
    assert_eq!(ids(&master.services()), BTreeSet::from([10, 11, 12]));
    assert_eq!(
        master.find(10).and_then(|s| s.extra.get("@class").cloned()),
        Some(json!("org.example.RegexRegisteredService"))
    );
    assert!(master.changes().unwrap().is_empty());
}

#[test]
fn test_round_trip_through_working_directory() {
    setup_logging();
    let temp_dir = TempDir::new().unwrap();
    let config = RegistryConfig::rooted_at(temp_dir.path());
    let factory = ManagerFactory::bootstrap(&config, &Vec::<RegisteredService>::new());
    let access = factory
        .for_principal(&SessionId::new("s"), &Principal::user("alice"))
        .unwrap();

    let mut record = definition(7, "portal")
        .with_description("Main portal")
        .with_evaluation_order(3);
    record
        .properties
        .insert("theme".to_string(), json!({"values": ["dark"]}));
    access.write(|m| m.save(record.clone())).unwrap();

    access.write(|m| m.load()).unwrap();
    assert_eq!(access.read(|m| m.find(7).cloned()), Some(record));
}

#[test]
fn test_concurrent_sessions_of_one_user() {
    setup_logging();
    let temp_dir = TempDir::new().unwrap();
    let config = RegistryConfig::rooted_at(temp_dir.path());
    let factory = ManagerFactory::bootstrap(&config, &vec![definition(1, "portal")]);
    let alice = Principal::user("alice");

    std::thread::scope(|scope| {
        for (session, base) in [("s1", 100), ("s2", 200)] {
            let factory = &factory;
            let alice = &alice;
            scope.spawn(move || {
                let access = factory
                    .for_principal(&SessionId::new(session), alice)
                    .unwrap();
                for i in 0..5 {
                    let id = base + i;
                    access
                        .write(|m| m.save(definition(id, &format!("svc{}", id))))
                        .unwrap();
                    access
                        .write(|m| m.publish(&format!("add {}", id)))
                        .unwrap();
                }
            });
        }
    });

    let access = factory
        .for_principal(&SessionId::new("s1"), &alice)
        .unwrap();
    let expected: BTreeSet<i64> = std::iter::once(1)
        .chain(100..105)
        .chain(200..205)
        .collect();
    assert_eq!(access.read(|m| ids(&m.services())), expected);
    assert!(access.read(|m| m.changes()).unwrap().is_empty());
    assert_eq!(factory.sessions().len(), 2);
}
