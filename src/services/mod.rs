//! Service definitions and their non-versioned storage
//!
//! A [`RegisteredService`] is one access-control entry. The submodules cover
//! how definitions are named on disk ([`naming`]), read and written as JSON
//! files ([`store`]), and indexed in memory ([`manager`]).

pub mod manager;
pub mod naming;
pub mod store;

pub use manager::{create_services_manager, DefaultServicesManager, DomainServicesManager, ServicesManager};
pub use naming::{DefaultNamingStrategy, NamingStrategy};
pub use store::{JsonServiceStore, ServiceSource, STAGING_SUFFIX};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Domain assigned to services whose URL pattern has no extractable host
pub const DEFAULT_DOMAIN: &str = "default";

/// One service definition
///
/// Known fields are typed; everything else in the JSON document is kept in
/// `extra` so records written by other tools survive a load/save cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredService {
    pub id: i64,
    pub name: String,
    /// URL pattern matched against incoming service URLs
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub evaluation_order: i32,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_strategy: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegisteredService {
    pub fn new(id: i64, name: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            service_id: service_id.into(),
            description: None,
            evaluation_order: 0,
            properties: Map::new(),
            access_strategy: None,
            extra: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_evaluation_order(mut self, order: i32) -> Self {
        self.evaluation_order = order;
        self
    }

    /// Host part of the URL pattern, or [`DEFAULT_DOMAIN`]
    pub fn domain(&self) -> String {
        extract_domain(&self.service_id)
    }
}

/// Extract the lower-cased host from a service URL pattern
///
/// Handles plain URLs as well as regex patterns such as
/// `^https://app\.example\.org/.*`.
pub fn extract_domain(service_id: &str) -> String {
    let pattern = service_id.trim().trim_start_matches('^');

    let Some((_, rest)) = pattern.split_once("://") else {
        return DEFAULT_DOMAIN.to_string();
    };

    let host: String = rest
        .replace("\\.", ".")
        .chars()
        .take_while(|c| !matches!(c, ':' | '/' | '(' | '?' | '$' | '|' | '\\' | '*'))
        .collect::<String>()
        .to_ascii_lowercase();

    let host = host.rsplit('@').next().unwrap_or_default().trim_matches('.');
    if host.is_empty() {
        DEFAULT_DOMAIN.to_string()
    } else {
        host.to_string()
    }
}
