//! Version-controlled registry
//!
//! Ties the services layer to git: a [`VersionControlServicesManager`] per
//! repository, a [`SessionStore`] for private managers, and the
//! [`ManagerFactory`] that bootstraps master and hands out managers.

pub mod factory;
pub mod manager;
pub mod session;

pub use factory::{
    BootstrapState, ManagerFactory, MasterManager, RegistryAccess, INITIAL_COMMIT_MESSAGE,
};
pub use manager::{Direction, ServiceChange, VersionControlServicesManager};
pub use session::{SessionManager, SessionStore};
