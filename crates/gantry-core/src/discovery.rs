//! Candidate-service discovery.
//!
//! Two strategies contribute candidates and are unioned with an explicit
//! precedence rule: services declared in config come first, then services
//! inferred from changed file paths via the terragrunt directory
//! convention. The union is deduplicated and order-stable; an empty result
//! is valid.

use regex::Regex;

use crate::config::WorkflowConfig;
use crate::label::Stack;

/// Result of a discovery pass.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    pub services: Vec<String>,
    pub excluded: Vec<ExcludedService>,
}

/// Service dropped from automation, with the operator-facing reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedService {
    pub service: String,
    pub kind: String,
    pub reason: String,
}

pub struct ServiceDiscovery<'a> {
    config: &'a WorkflowConfig,
}

impl<'a> ServiceDiscovery<'a> {
    pub fn new(config: &'a WorkflowConfig) -> Self {
        Self { config }
    }

    /// Union of the declared and inferred strategies, minus services
    /// excluded from automation.
    pub fn discover(&self, changed_files: &[String]) -> DiscoveryOutcome {
        let mut services = self.declared();
        for service in self.inferred(changed_files) {
            if !services.contains(&service) {
                services.push(service);
            }
        }

        let mut outcome = DiscoveryOutcome::default();
        for service in services {
            match self.exclusion(&service) {
                Some(excluded) => outcome.excluded.push(excluded),
                None => outcome.services.push(service),
            }
        }
        outcome
    }

    /// Every service declared in config, in declaration order.
    pub fn declared(&self) -> Vec<String> {
        self.config
            .services
            .iter()
            .map(|service| service.name.clone())
            .collect()
    }

    /// Services named by changed paths matching the terragrunt convention.
    ///
    /// A convention without a `{service}` placeholder cannot name services
    /// and yields nothing. Matches starting with `.` are discarded.
    pub fn inferred(&self, changed_files: &[String]) -> Vec<String> {
        let Some(template) = self.config.directory_conventions.for_stack(Stack::Terragrunt) else {
            return Vec::new();
        };
        let Some(matcher) = service_matcher(template) else {
            return Vec::new();
        };

        let mut services = Vec::new();
        for file in changed_files {
            let Some(captures) = matcher.captures(file) else {
                continue;
            };
            let service = captures["service"].to_string();
            if service.starts_with('.') {
                continue;
            }
            if !services.contains(&service) {
                services.push(service);
            }
        }
        services
    }

    fn exclusion(&self, service: &str) -> Option<ExcludedService> {
        let config = self.config.service(service)?;
        if !config.exclude_from_automation {
            return None;
        }
        let exclusion = config.exclusion_config.as_ref();
        Some(ExcludedService {
            service: service.to_string(),
            kind: exclusion
                .and_then(|e| e.kind.clone())
                .unwrap_or_else(|| "unspecified".to_string()),
            reason: exclusion
                .and_then(|e| e.reason.clone())
                .unwrap_or_else(|| "No reason specified".to_string()),
        })
    }
}

/// Compile a path template into a prefix matcher capturing `{service}`.
/// Returns `None` when the template has no `{service}` placeholder.
pub fn service_matcher(template: &str) -> Option<Regex> {
    if !template.contains("{service}") {
        return None;
    }
    Regex::new(&format!("^{}", template_pattern(template, false))).ok()
}

/// Compile a path template into a prefix matcher capturing both
/// `{service}` and `{environment}`.
pub fn target_matcher(template: &str) -> Option<Regex> {
    if !template.contains("{service}") {
        return None;
    }
    Regex::new(&format!("^{}", template_pattern(template, true))).ok()
}

// Placeholders become path-segment captures; everything else is matched
// literally.
fn template_pattern(template: &str, capture_environment: bool) -> String {
    let environment_pattern = if capture_environment {
        "(?P<environment>[^/]+)"
    } else {
        "[^/]+"
    };
    regex::escape(template)
        .replace(&regex::escape("{service}"), "(?P<service>[^/]+)")
        .replace(&regex::escape("{environment}"), environment_pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_matcher_captures_first_segment() {
        let matcher = service_matcher("{service}/terragrunt/envs/{environment}").unwrap();
        let captures = matcher
            .captures("order-service/terragrunt/envs/develop/main.hcl")
            .unwrap();
        assert_eq!(&captures["service"], "order-service");
        assert!(matcher.captures("docs/readme.md").is_none());
    }

    #[test]
    fn service_matcher_requires_placeholder() {
        assert!(service_matcher("infrastructure/terragrunt").is_none());
    }

    #[test]
    fn target_matcher_captures_environment_too() {
        let matcher = target_matcher("{service}/kubernetes/overlays/{environment}").unwrap();
        let captures = matcher
            .captures("cart/kubernetes/overlays/staging/kustomization.yaml")
            .unwrap();
        assert_eq!(&captures["service"], "cart");
        assert_eq!(&captures["environment"], "staging");
    }
}
