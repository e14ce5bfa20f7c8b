//! Comprehensive configuration validation with detailed, non-fatal
//! reporting, layered on top of [`crate::models::config::GlobalConfig::validate`]'s
//! fatal checks.

use crate::models::config::GlobalConfig;

/// Result of a validation pass: errors make the configuration unusable,
/// warnings and recommendations do not.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            ..Default::default()
        }
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(error.into());
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn add_recommendation(&mut self, recommendation: impl Into<String>) {
        self.recommendations.push(recommendation.into());
    }
}

/// Runs every check the gateway needs before it can start serving traffic.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a [`GlobalConfig`], returning structural errors (fatal),
    /// reachability/consistency warnings, and tuning recommendations.
    pub fn validate_comprehensive(config: &GlobalConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        if let Err(e) = config.validate() {
            result.add_error(e.to_string());
        }

        if config.default_backend.is_none() && config.routes.is_empty() && config.composite_routes.is_empty() {
            result.add_error(
                "no default_backend and no routes configured — every request would 404".to_string(),
            );
        }

        if let Some(default) = &config.default_backend {
            if !config.backend_services.contains_key(default) {
                result.add_error(format!(
                    "default_backend '{default}' is not declared in backend_services"
                ));
            }
        }

        for (pattern, route) in &config.routes {
            for backend in route.target.backends() {
                if !config.backend_services.contains_key(backend) {
                    result.add_error(format!(
                        "route '{pattern}' references undeclared backend '{backend}'"
                    ));
                }
            }
            if let Some(alt) = &route.config.alternative_backend {
                if !config.backend_services.contains_key(alt) {
                    result.add_warning(format!(
                        "route '{pattern}' alternative_backend '{alt}' is not declared"
                    ));
                }
            }
        }

        for (pattern, composite) in &config.composite_routes {
            if composite.backends.is_empty() {
                result.add_error(format!("composite route '{pattern}' has no backends"));
            }
            for backend in &composite.backends {
                if !config.backend_services.contains_key(backend) {
                    result.add_error(format!(
                        "composite route '{pattern}' references undeclared backend '{backend}'"
                    ));
                }
            }
        }

        for (id, backend) in &config.backend_services {
            if backend.url.is_empty() {
                result.add_warning(format!(
                    "backend '{id}' has no URL at the global level; it must be supplied by every tenant that uses it"
                ));
            }
        }

        if config.cache.enabled && config.cache.capacity == 0 {
            result.add_recommendation(
                "cache is enabled with capacity 0 — every entry will be evicted immediately".to_string(),
            );
        }

        if config.circuit_breaker.failure_threshold == 0 {
            result.add_warning(
                "circuit_breaker.failure_threshold is 0 — the breaker will open on the first request".to_string(),
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::BackendConfig;

    fn backend(url: &str) -> BackendConfig {
        BackendConfig {
            url: url.to_string(),
            path_rewriting: Default::default(),
            header_rewriting: Default::default(),
            endpoints: Default::default(),
            circuit_breaker_override: None,
        }
    }

    #[test]
    fn flags_missing_default_backend_reference() {
        let mut config = GlobalConfig::default();
        config.default_backend = Some("api".to_string());
        let result = ConfigValidator::validate_comprehensive(&config);
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("api")));
    }

    #[test]
    fn accepts_minimal_valid_config() {
        let mut config = GlobalConfig::default();
        config.backend_services.insert("api".to_string(), backend("http://localhost:9000"));
        config.default_backend = Some("api".to_string());
        let result = ConfigValidator::validate_comprehensive(&config);
        assert!(result.is_valid, "{:?}", result.errors);
    }

    #[test]
    fn warns_on_empty_global_url_without_failing() {
        let mut config = GlobalConfig::default();
        config.backend_services.insert("legacy".to_string(), backend(""));
        config.default_backend = Some("legacy".to_string());
        let result = ConfigValidator::validate_comprehensive(&config);
        assert!(result.is_valid);
        assert!(!result.warnings.is_empty());
    }
}
