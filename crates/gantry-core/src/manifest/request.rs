//! Per-target manifest update request and its derived names.

use std::path::PathBuf;

/// Hard cap on generated feature branch names; downstream systems that
/// consume the branch name impose a 63-character limit.
pub const MAX_BRANCH_NAME_LEN: usize = 63;

const SHORT_SHA_LEN: usize = 7;

/// Everything needed to land one manifest into the GitOps repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestUpdateRequest {
    pub service: String,
    pub environment: String,
    pub manifest_file: PathBuf,
    pub target_repo: String,
    pub target_branch: String,
    pub source_sha: String,
    pub source_repo: String,
    pub pr_number: Option<u64>,
}

impl ManifestUpdateRequest {
    /// `auto-update/{service}-{environment}-{sha}`, truncated to 63
    /// characters. The dry run derives the identical name.
    pub fn feature_branch_name(&self) -> String {
        let name = format!(
            "auto-update/{}-{}-{}",
            self.service,
            self.environment,
            short_sha(&self.source_sha)
        );
        truncate(name, MAX_BRANCH_NAME_LEN)
    }

    /// `{environment}/{service}.yaml` inside the target repository.
    pub fn target_file_path(&self) -> String {
        format!("{}/{}.yaml", self.environment, self.service)
    }

    pub fn pull_request_title(&self) -> String {
        format!(
            "[Auto] Update {} manifests for {} environment",
            self.service, self.environment
        )
    }

    pub fn pull_request_labels(&self) -> Vec<String> {
        vec![
            format!("environment:{}", self.environment),
            format!("service:{}", self.service),
            "auto-generated".to_string(),
        ]
    }

    pub fn commit_message(&self) -> String {
        format!(
            "Update {service} manifests for {environment} environment\n\n\
             Generated from: {repo}@{sha}\n\
             Service: {service}\n\
             Environment: {environment}\n\
             Target branch: {branch}",
            service = self.service,
            environment = self.environment,
            repo = self.source_repo,
            sha = self.source_sha,
            branch = self.target_branch,
        )
    }

    pub fn pull_request_body(&self) -> String {
        let mut body = format!(
            "## Automated Manifest Update\n\n\
             **Service**: {service}\n\
             **Environment**: {environment}\n\
             **Source Repository**: {repo}\n\
             **Source Commit**: {sha}\n\
             **Generated File**: `{file}`\n",
            service = self.service,
            environment = self.environment,
            repo = self.source_repo,
            sha = self.source_sha,
            file = self.target_file_path(),
        );
        if let Some(number) = self.pr_number {
            body.push_str(&format!(
                "\n### Source Pull Request\n- **PR**: https://github.com/{}/pull/{number}\n",
                self.source_repo
            ));
        }
        body.push_str(
            "\n---\n*This PR was created automatically by the manifest update workflow.*",
        );
        body
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !is_valid_identifier(&self.service) {
            anyhow::bail!("Invalid service name: '{}'", self.service);
        }
        if !is_valid_identifier(&self.environment) {
            anyhow::bail!("Invalid environment name: '{}'", self.environment);
        }
        if self.target_repo.is_empty() || self.target_branch.is_empty() {
            anyhow::bail!("Target repository and branch are required");
        }
        if self.source_sha.is_empty() {
            anyhow::bail!("Source commit is required");
        }
        Ok(())
    }
}

fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(SHORT_SHA_LEN) {
        Some((index, _)) => &sha[..index],
        None => sha,
    }
}

fn truncate(name: String, max: usize) -> String {
    if name.chars().count() <= max {
        return name;
    }
    name.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(service: &str, environment: &str, sha: &str) -> ManifestUpdateRequest {
        ManifestUpdateRequest {
            service: service.to_string(),
            environment: environment.to_string(),
            manifest_file: PathBuf::from("build/manifest.yaml"),
            target_repo: "acme/manifests".to_string(),
            target_branch: "main".to_string(),
            source_sha: sha.to_string(),
            source_repo: "acme/app".to_string(),
            pr_number: Some(42),
        }
    }

    #[test]
    fn branch_name_uses_short_sha() {
        let req = request("orders", "staging", "0123456789abcdef0123456789abcdef01234567");
        assert_eq!(req.feature_branch_name(), "auto-update/orders-staging-0123456");
    }

    #[test]
    fn branch_name_never_exceeds_limit() {
        let req = request(
            "a-service-with-a-remarkably-long-name",
            "a-very-long-environment-name",
            "0123456789abcdef0123456789abcdef01234567",
        );
        let name = req.feature_branch_name();
        assert_eq!(name.chars().count(), MAX_BRANCH_NAME_LEN);

        let short = request("svc", "dev", "abc");
        assert_eq!(short.feature_branch_name(), "auto-update/svc-dev-abc");
    }

    #[test]
    fn target_file_path_is_env_slash_service() {
        let req = request("orders", "staging", "abcdef0");
        assert_eq!(req.target_file_path(), "staging/orders.yaml");
    }

    #[test]
    fn validate_rejects_path_like_names() {
        assert!(request("orders", "staging", "abcdef0").validate().is_ok());
        assert!(request("../etc", "staging", "abcdef0").validate().is_err());
        assert!(request("orders", "stag/ing", "abcdef0").validate().is_err());
        assert!(request("", "staging", "abcdef0").validate().is_err());
    }
}
