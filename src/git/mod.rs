//! Git plumbing for the registry
//!
//! [`repository`] wraps a single working directory; [`factory`] decides which
//! working directory a principal gets.

pub mod factory;
pub mod repository;

pub use factory::{PrivateRepository, RepositoryFactory, RepositoryHandle, WorkspaceLock};
pub use repository::{ChangeStatus, CommitInfo, FileChange, GitRepository, CREATED_MESSAGE, PUBLISHED_REF};
