//! Static service registry with a concurrently updated health cache

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use dashmap::DashMap;

use crate::error::{AppError, Result};

/// Cached outcome of the most recently completed probe for one service
#[derive(Debug, Clone, Copy)]
pub struct HealthState {
    pub healthy: bool,
    pub last_checked: Instant,
}

/// Maps logical service names to base URLs and tracks probe results.
///
/// The name -> URL table is fixed at startup. Health entries are written
/// only by the background prober; readers see the most recently completed
/// probe and never wait on an in-flight one. A service with no recorded
/// probe is reported unhealthy.
pub struct ServiceRegistry {
    services: HashMap<String, String>,
    health: DashMap<String, HealthState>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            health: DashMap::new(),
        }
    }

    /// Register a service at startup. A name registered twice keeps its
    /// first base URL.
    pub fn register(&mut self, name: impl Into<String>, base_url: impl Into<String>) {
        let base_url = base_url.into();
        self.services
            .entry(name.into())
            .or_insert_with(|| base_url.trim_end_matches('/').to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Base URL for a registered service
    pub fn url_for(&self, name: &str) -> Result<&str> {
        self.services
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| AppError::UnknownService(name.to_string()))
    }

    /// All registered `(name, base_url)` pairs
    pub fn services(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.services.iter().map(|(n, u)| (n.as_str(), u.as_str()))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Whether the most recent probe succeeded. Unhealthy until the first
    /// successful probe completes.
    pub fn is_healthy(&self, name: &str) -> bool {
        self.health.get(name).map(|s| s.healthy).unwrap_or(false)
    }

    /// Record a completed probe outcome. Only the health prober calls this.
    pub fn mark(&self, name: &str, healthy: bool) {
        if !self.services.contains_key(name) {
            return;
        }
        self.health.insert(
            name.to_string(),
            HealthState {
                healthy,
                last_checked: Instant::now(),
            },
        );
    }

    pub fn health_state(&self, name: &str) -> Option<HealthState> {
        self.health.get(name).map(|s| *s)
    }

    /// Cached health of every registered service, for status payloads
    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.services
            .keys()
            .map(|name| (name.clone(), self.is_healthy(name)))
            .collect()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ServiceRegistry {
        let mut registry = ServiceRegistry::new();
        registry.register("notes", "http://localhost:9100");
        registry.register("auth", "http://localhost:9101/");
        registry
    }

    #[test]
    fn test_url_for_unknown_service() {
        let registry = registry();
        assert!(matches!(
            registry.url_for("billing"),
            Err(AppError::UnknownService(name)) if name == "billing"
        ));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let registry = registry();
        assert_eq!(registry.url_for("auth").unwrap(), "http://localhost:9101");
    }

    #[test]
    fn test_unhealthy_until_first_successful_probe() {
        let registry = registry();
        assert!(!registry.is_healthy("notes"));

        registry.mark("notes", true);
        assert!(registry.is_healthy("notes"));

        registry.mark("notes", false);
        assert!(!registry.is_healthy("notes"));
    }

    #[test]
    fn test_mark_ignores_unregistered_names() {
        let registry = registry();
        registry.mark("billing", true);
        assert!(!registry.is_healthy("billing"));
        assert!(registry.health_state("billing").is_none());
    }

    #[test]
    fn test_first_registration_wins() {
        let mut registry = registry();
        registry.register("notes", "http://elsewhere:9999");
        assert_eq!(registry.url_for("notes").unwrap(), "http://localhost:9100");
    }

    #[test]
    fn test_snapshot_covers_all_services() {
        let registry = registry();
        registry.mark("notes", true);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["notes"], true);
        assert_eq!(snapshot["auth"], false);
    }
}
