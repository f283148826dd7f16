//! Version-controlled registry of service definitions
//!
//! Service definitions are JSON files inside git working directories. A
//! master repository holds the published registry; every editing user works
//! in a private clone of master and publishes from there.

pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod principal;
pub mod registry;
pub mod service;
pub mod services;

// Re-export commonly used types
pub use config::{ManagementType, RegistryConfig};
pub use error::{RegistryError, RegistryResult};
pub use principal::{Principal, SessionId};
pub use registry::{BootstrapState, ManagerFactory, RegistryAccess, VersionControlServicesManager};
pub use service::RegistryService;
pub use services::{RegisteredService, ServiceSource};
