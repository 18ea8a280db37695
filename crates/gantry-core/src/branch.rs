//! Branch classification.
//!
//! Two distinct questions are answered here: which deploy labels a branch
//! implies on its own, and which single environment a branch selects when
//! the labels come from a merged pull request. Callers must not conflate
//! the two.

use std::path::Path;

use regex::Regex;

use crate::config::{BranchPattern, WorkflowConfig, expand_template};
use crate::discovery::ServiceDiscovery;
use crate::error::{PipelineError, Result};
use crate::label::{DeployLabel, Stack};

pub const DEVELOP: &str = "develop";
const STAGING_PREFIX: &str = "staging/";
const PRODUCTION_PREFIX: &str = "production/";

/// Deploy labels implied directly by a branch name.
///
/// `develop` fans out to every discovered service whose develop terragrunt
/// directory exists under `workdir`; `staging/<service>` and
/// `production/<service>` name a single service with no existence check.
/// Unrecognized branches imply nothing, which is not an error.
pub fn labels_for_branch(
    branch: &str,
    changed_files: &[String],
    config: &WorkflowConfig,
    workdir: &Path,
) -> Vec<DeployLabel> {
    if branch == DEVELOP {
        return ServiceDiscovery::new(config)
            .discover(changed_files)
            .services
            .into_iter()
            .filter(|service| develop_workdir_exists(service, config, workdir))
            .map(|service| DeployLabel::new(service, DEVELOP))
            .collect();
    }
    if let Some(service) = branch.strip_prefix(STAGING_PREFIX)
        && !service.is_empty()
    {
        return vec![DeployLabel::new(service, "staging")];
    }
    if let Some(service) = branch.strip_prefix(PRODUCTION_PREFIX)
        && !service.is_empty()
    {
        return vec![DeployLabel::new(service, "production")];
    }
    Vec::new()
}

fn develop_workdir_exists(service: &str, config: &WorkflowConfig, workdir: &Path) -> bool {
    match config.directory_convention_for(service, Stack::Terragrunt) {
        Some(template) => workdir
            .join(expand_template(template, service, DEVELOP))
            .is_dir(),
        None => false,
    }
}

/// The single environment a branch selects for merged-PR-driven deploys.
///
/// Configured branch patterns win (exact name or `*` wildcard); the
/// built-in fallback maps `production/*` and `staging/*`, and everything
/// else to develop. The resolved environment must exist in config.
pub fn target_environment(branch: &str, config: &WorkflowConfig) -> Result<String> {
    let environment = configured_environment(branch, config)
        .unwrap_or_else(|| fallback_environment(branch).to_string());
    if !config.has_environment(&environment) {
        return Err(PipelineError::Configuration(format!(
            "Target environment '{environment}' not found in configuration"
        )));
    }
    Ok(environment)
}

fn configured_environment(branch: &str, config: &WorkflowConfig) -> Option<String> {
    for (name, pattern) in &config.branch_patterns {
        match pattern {
            BranchPattern::Matcher {
                pattern: Some(glob),
                target_environment,
            } => {
                if wildcard_match(glob, branch) {
                    return Some(target_environment.clone());
                }
            }
            BranchPattern::Matcher {
                pattern: None,
                target_environment,
            } if name == branch => {
                return Some(target_environment.clone());
            }
            BranchPattern::Environment(environment) if name == branch => {
                return Some(environment.clone());
            }
            _ => {}
        }
    }
    None
}

fn fallback_environment(branch: &str) -> &'static str {
    if branch
        .strip_prefix(PRODUCTION_PREFIX)
        .is_some_and(|rest| !rest.is_empty())
    {
        "production"
    } else if branch
        .strip_prefix(STAGING_PREFIX)
        .is_some_and(|rest| !rest.is_empty())
    {
        "staging"
    } else {
        DEVELOP
    }
}

fn wildcard_match(pattern: &str, branch: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == branch;
    }
    let anchored = format!("^{}$", regex::escape(pattern).replace(r"\*", ".*"));
    Regex::new(&anchored)
        .map(|re| re.is_match(branch))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_shell_style_patterns() {
        assert!(wildcard_match("release/*", "release/2024-07"));
        assert!(wildcard_match("hotfix", "hotfix"));
        assert!(!wildcard_match("release/*", "feature/release"));
    }

    #[test]
    fn fallback_maps_prefixes() {
        assert_eq!(fallback_environment("production/orders"), "production");
        assert_eq!(fallback_environment("staging/orders"), "staging");
        assert_eq!(fallback_environment("feature/x"), "develop");
        // a bare prefix with no service falls through to develop
        assert_eq!(fallback_environment("staging/"), "develop");
    }
}
