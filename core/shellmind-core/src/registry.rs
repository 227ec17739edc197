//! Which models the service has loaded.
//!
//! Name matching follows Ollama tag conventions: `zsh-assistant` matches
//! `zsh-assistant:latest` and any other tag of that model, while
//! `zsh-assistant:q4` only matches itself.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::service::{ModelInfo, ModelService, ServiceProbe};

pub struct ModelRegistry {
    service: Arc<dyn ModelService>,
    timeout: Duration,
}

impl ModelRegistry {
    pub fn new(service: Arc<dyn ModelService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Builds a registry over the probe's client with the configured list budget.
    pub fn from_probe(probe: &ServiceProbe) -> Self {
        Self::new(probe.service().clone(), probe.settings().list_timeout())
    }

    pub fn list(&self) -> Result<Vec<ModelInfo>> {
        self.service.list_models(self.timeout)
    }

    pub fn find(&self, name: &str) -> Result<Option<ModelInfo>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|model| model_matches(&model.name, name)))
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.find(name)?.is_some())
    }
}

/// True if the loaded model `candidate` satisfies a request for `wanted`.
pub fn model_matches(candidate: &str, wanted: &str) -> bool {
    if candidate == wanted {
        return true;
    }
    match wanted.split_once(':') {
        Some((base, "latest")) => candidate == base,
        Some(_) => false,
        None => candidate
            .strip_prefix(wanted)
            .is_some_and(|rest| rest.starts_with(':')),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubService;

    #[test]
    fn untagged_name_matches_any_tag() {
        assert!(model_matches("zsh-assistant:latest", "zsh-assistant"));
        assert!(model_matches("zsh-assistant:q4", "zsh-assistant"));
        assert!(!model_matches("zsh-assistant-v2:latest", "zsh-assistant"));
    }

    #[test]
    fn tagged_name_matches_exactly() {
        assert!(model_matches("codellama:7b", "codellama:7b"));
        assert!(!model_matches("codellama:13b", "codellama:7b"));
        assert!(model_matches("codellama", "codellama:latest"));
    }

    #[test]
    fn find_returns_loaded_model() {
        let service = Arc::new(StubService::reachable().with_models(&[
            "codellama:7b",
            "zsh-assistant:latest",
        ]));
        let registry = ModelRegistry::new(service.clone(), Duration::from_millis(100));
        let found = registry.find("zsh-assistant").expect("list").expect("found");
        assert_eq!(found.name, "zsh-assistant:latest");
        assert!(!registry.contains("mistral").expect("list"));
        assert_eq!(service.list_calls(), 2);
    }

    #[test]
    fn unreachable_service_is_an_error() {
        let registry = ModelRegistry::new(
            Arc::new(StubService::unreachable()),
            Duration::from_millis(100),
        );
        assert!(registry.list().unwrap_err().is_unreachable());
    }
}
