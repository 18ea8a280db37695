//! Workflow configuration schema.
//!
//! Mirrors the YAML layout of `workflow-config.yaml`: environments and
//! services are declared as arrays keyed by name, directory conventions as
//! path templates with `{service}`/`{environment}` placeholders. The
//! loaded config is a read-only snapshot for the duration of one run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::label::Stack;

/// Root workflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub environments: Vec<EnvironmentConfig>,

    #[serde(default)]
    pub directory_conventions: DirectoryConventions,

    #[serde(default)]
    pub services: Vec<ServiceConfig>,

    /// Values applied when an environment omits them.
    #[serde(default)]
    pub defaults: EnvironmentDefaults,

    /// Branch name patterns selecting a target environment.
    #[serde(default)]
    pub branch_patterns: BTreeMap<String, BranchPattern>,

    #[serde(default)]
    pub safety_checks: SafetyChecks,

    #[serde(default)]
    pub terraform_version: Option<String>,

    #[serde(default)]
    pub terragrunt_version: Option<String>,
}

/// Per-environment deployment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub environment: String,

    #[serde(default)]
    pub aws_region: Option<String>,

    #[serde(default)]
    pub iam_role_plan: Option<String>,

    #[serde(default)]
    pub iam_role_apply: Option<String>,
}

/// Path templates per stack lane.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DirectoryConventions {
    #[serde(default)]
    pub terragrunt: Option<String>,

    #[serde(default)]
    pub kubernetes: Option<String>,
}

impl DirectoryConventions {
    pub fn for_stack(&self, stack: Stack) -> Option<&str> {
        match stack {
            Stack::Terragrunt => self.terragrunt.as_deref(),
            Stack::Kubernetes => self.kubernetes.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terragrunt.is_none() && self.kubernetes.is_none()
    }
}

/// Declared service with optional per-service overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,

    /// Overrides the global directory conventions for this service.
    #[serde(default)]
    pub directory_conventions: Option<DirectoryConventions>,

    /// Excluded services never receive automated deploy labels.
    #[serde(default)]
    pub exclude_from_automation: bool,

    #[serde(default)]
    pub exclusion_config: Option<ExclusionConfig>,
}

/// Operator-facing metadata for an excluded service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExclusionConfig {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    #[serde(default)]
    pub reason: Option<String>,
}

/// Fallback values for environments and tool versions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvironmentDefaults {
    #[serde(default)]
    pub aws_region: Option<String>,

    #[serde(default)]
    pub iam_role_plan: Option<String>,

    #[serde(default)]
    pub iam_role_apply: Option<String>,

    #[serde(default)]
    pub terraform_version: Option<String>,

    #[serde(default)]
    pub terragrunt_version: Option<String>,
}

/// A branch pattern entry: either a bare environment name, or a matcher
/// with an optional `*` wildcard pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BranchPattern {
    Matcher {
        #[serde(default)]
        pattern: Option<String>,
        target_environment: String,
    },
    Environment(String),
}

/// Policy gates evaluated before trusting a deployment matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyChecks {
    #[serde(default)]
    pub require_merged_pr: bool,

    /// Escalates a missing merged PR from a warning to a hard failure.
    #[serde(default)]
    pub fail_on_missing_pr: bool,

    /// Upper bound on pipeline re-entries for one commit; 0 disables the
    /// check. The validator only compares, it never counts.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Branches that may deploy without a merged PR. An empty list leaves
    /// the check disabled rather than forbidding every branch.
    #[serde(default)]
    pub allowed_direct_push_branches: Vec<String>,
}

fn default_max_retry_attempts() -> u32 {
    3
}

impl Default for SafetyChecks {
    fn default() -> Self {
        Self {
            require_merged_pr: false,
            fail_on_missing_pr: false,
            max_retry_attempts: default_max_retry_attempts(),
            allowed_direct_push_branches: Vec::new(),
        }
    }
}

/// An environment merged with the configured defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnvironment {
    pub aws_region: String,
    pub iam_role_plan: Option<String>,
    pub iam_role_apply: Option<String>,
}

/// Tool versions carried into every matrix item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolVersions {
    pub terraform: Option<String>,
    pub terragrunt: Option<String>,
}

impl WorkflowConfig {
    pub fn environment(&self, name: &str) -> Option<&EnvironmentConfig> {
        self.environments.iter().find(|env| env.environment == name)
    }

    pub fn has_environment(&self, name: &str) -> bool {
        self.environment(name).is_some()
    }

    /// Environment settings merged with defaults. `None` when the
    /// environment is unknown or no region can be resolved.
    pub fn resolved_environment(&self, name: &str) -> Option<ResolvedEnvironment> {
        let env = self.environment(name)?;
        let aws_region = env
            .aws_region
            .clone()
            .or_else(|| self.defaults.aws_region.clone())?;
        Some(ResolvedEnvironment {
            aws_region,
            iam_role_plan: env
                .iam_role_plan
                .clone()
                .or_else(|| self.defaults.iam_role_plan.clone()),
            iam_role_apply: env
                .iam_role_apply
                .clone()
                .or_else(|| self.defaults.iam_role_apply.clone()),
        })
    }

    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|service| service.name == name)
    }

    /// Directory convention template for a service, preferring the
    /// service-level override over the global table.
    pub fn directory_convention_for(&self, service: &str, stack: Stack) -> Option<&str> {
        if let Some(conventions) = self.service(service).and_then(|s| s.directory_conventions.as_ref())
            && let Some(template) = conventions.for_stack(stack)
        {
            return Some(template);
        }
        self.directory_conventions.for_stack(stack)
    }

    pub fn tool_versions(&self) -> ToolVersions {
        ToolVersions {
            terraform: self
                .terraform_version
                .clone()
                .or_else(|| self.defaults.terraform_version.clone()),
            terragrunt: self
                .terragrunt_version
                .clone()
                .or_else(|| self.defaults.terragrunt_version.clone()),
        }
    }

    /// Structural validation applied at load time.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.environments.is_empty() {
            anyhow::bail!("Configuration must declare at least one environment");
        }
        for (index, env) in self.environments.iter().enumerate() {
            if env.environment.is_empty() {
                anyhow::bail!("Environment {index} must have an 'environment' key");
            }
            if env.aws_region.is_none() && self.defaults.aws_region.is_none() {
                anyhow::bail!(
                    "Environment '{}' has no 'aws_region' and no default is configured",
                    env.environment
                );
            }
        }

        let mut seen = Vec::new();
        for env in &self.environments {
            if seen.contains(&env.environment.as_str()) {
                anyhow::bail!("Environment '{}' is declared twice", env.environment);
            }
            seen.push(env.environment.as_str());
        }

        if self.directory_conventions.terragrunt.is_none() {
            anyhow::bail!("directory_conventions must have a 'terragrunt' template");
        }

        for (index, service) in self.services.iter().enumerate() {
            if service.name.is_empty() {
                anyhow::bail!("Service {index} must have a 'name' key");
            }
        }

        Ok(())
    }
}

/// Substitute `{service}` and `{environment}` placeholders in a path
/// template.
pub fn expand_template(template: &str, service: &str, environment: &str) -> String {
    template
        .replace("{service}", service)
        .replace("{environment}", environment)
}
