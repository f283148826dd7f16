//! File naming for service definitions

use super::RegisteredService;

/// Maps a service definition to the file name it is stored under
///
/// Implementations must be pure: the same definition always yields the same
/// name, and the name only depends on fields that identify the record.
pub trait NamingStrategy: Send + Sync {
    fn name(&self, service: &RegisteredService) -> String;

    /// Whether `file_name` could have been produced for a service with this id
    fn matches_id(&self, file_name: &str, id: i64) -> bool;
}

/// `"{name}-{id}.json"` with whitespace removed
///
/// Path separators and control characters in the name become `_`, and
/// leading dots are dropped, so the result is always a single visible file
/// name inside the registry directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNamingStrategy;

/// Name used when nothing of the service name survives sanitizing
const FALLBACK_NAME: &str = "service";

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

impl NamingStrategy for DefaultNamingStrategy {
    fn name(&self, service: &RegisteredService) -> String {
        format!("{}-{}.json", sanitize(&service.name), service.id)
    }

    fn matches_id(&self, file_name: &str, id: i64) -> bool {
        file_name
            .strip_suffix(&format!("-{}.json", id))
            .is_some_and(|stem| !stem.is_empty())
    }
}
