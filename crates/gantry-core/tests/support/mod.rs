//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;

use gantry_core::config::{
    DirectoryConventions, EnvironmentConfig, ServiceConfig, WorkflowConfig,
};
use gantry_core::vcs::{CreatedPullRequest, NewPullRequest, PullRequest, VcsGateway};

/// Workflow config with develop/staging/production environments and the
/// conventional directory templates.
pub fn sample_config() -> WorkflowConfig {
    let mut config = WorkflowConfig {
        directory_conventions: DirectoryConventions {
            terragrunt: Some("{service}/terragrunt/envs/{environment}".to_string()),
            kubernetes: Some("{service}/kubernetes/overlays/{environment}".to_string()),
        },
        terraform_version: Some("1.12.1".to_string()),
        terragrunt_version: Some("0.81.0".to_string()),
        ..WorkflowConfig::default()
    };
    for environment in ["develop", "staging", "production"] {
        config.environments.push(EnvironmentConfig {
            environment: environment.to_string(),
            aws_region: Some("ap-northeast-1".to_string()),
            iam_role_plan: Some(format!("arn:aws:iam::123:role/plan-{environment}")),
            iam_role_apply: Some(format!("arn:aws:iam::123:role/apply-{environment}")),
        });
    }
    config
}

pub fn declare_service(config: &mut WorkflowConfig, name: &str) {
    config.services.push(ServiceConfig {
        name: name.to_string(),
        directory_conventions: None,
        exclude_from_automation: false,
        exclusion_config: None,
    });
}

/// In-memory VCS gateway that records every mutating call in order.
#[derive(Default)]
pub struct FakeVcs {
    pub prs: HashMap<u64, PullRequest>,
    /// Keyed by branch name; returned by `find_merged_pr`.
    pub merged: HashMap<String, u64>,
    /// Paths for which `write_repo_file` reports no changes.
    pub unchanged_paths: Vec<String>,
    /// Repo paths whose writes fail.
    pub failing_paths: Vec<String>,
    /// Fail `upsert_tagged_comment` calls.
    pub fail_comments: bool,
    pub calls: RefCell<Vec<String>>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pr(mut self, pr: PullRequest) -> Self {
        self.prs.insert(pr.number, pr);
        self
    }

    pub fn with_merged(mut self, branch: &str, number: u64) -> Self {
        self.merged.insert(branch.to_string(), number);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| {
                call.starts_with("write:")
                    || call.starts_with("create_pr:")
                    || call.starts_with("automerge:")
                    || call.starts_with("add:")
                    || call.starts_with("remove:")
                    || call.starts_with("ensure:")
                    || call.starts_with("comment:")
            })
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl VcsGateway for FakeVcs {
    fn find_merged_pr(&self, branch: &str, _sha: &str) -> anyhow::Result<Option<PullRequest>> {
        self.record(format!("find_merged:{branch}"));
        Ok(self
            .merged
            .get(branch)
            .and_then(|number| self.prs.get(number))
            .cloned())
    }

    fn pull_request(&self, number: u64) -> anyhow::Result<PullRequest> {
        self.record(format!("pull_request:{number}"));
        self.prs
            .get(&number)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("PR #{number} not found"))
    }

    fn labels_for_pr(&self, number: u64) -> anyhow::Result<Vec<String>> {
        self.record(format!("labels_for:{number}"));
        Ok(self
            .prs
            .get(&number)
            .map(|pr| pr.labels.clone())
            .unwrap_or_default())
    }

    fn ensure_label_exists(&self, name: &str) -> anyhow::Result<()> {
        self.record(format!("ensure:{name}"));
        Ok(())
    }

    fn add_label(&self, number: u64, label: &str) -> anyhow::Result<()> {
        self.record(format!("add:{number}:{label}"));
        Ok(())
    }

    fn remove_label(&self, number: u64, label: &str) -> anyhow::Result<()> {
        self.record(format!("remove:{number}:{label}"));
        Ok(())
    }

    fn upsert_tagged_comment(&self, number: u64, _content: &str, tag: &str) -> anyhow::Result<()> {
        self.record(format!("comment:{number}:{tag}"));
        if self.fail_comments {
            anyhow::bail!("comment API unavailable");
        }
        Ok(())
    }

    fn write_repo_file(
        &self,
        repo: &str,
        branch: &str,
        _base_branch: &str,
        path: &str,
        _content: &str,
        _message: &str,
    ) -> anyhow::Result<bool> {
        self.record(format!("write:{repo}:{branch}:{path}"));
        if self.failing_paths.iter().any(|p| p == path) {
            anyhow::bail!("write rejected for {path}");
        }
        Ok(!self.unchanged_paths.iter().any(|p| p == path))
    }

    fn create_pull_request(&self, req: &NewPullRequest) -> anyhow::Result<CreatedPullRequest> {
        self.record(format!("create_pr:{}:{}", req.repo, req.head));
        Ok(CreatedPullRequest {
            number: 900,
            url: format!("https://github.com/{}/pull/900", req.repo),
        })
    }

    fn enable_auto_merge(
        &self,
        repo: &str,
        number: u64,
        merge_method: &str,
    ) -> anyhow::Result<()> {
        self.record(format!("automerge:{repo}:{number}:{merge_method}"));
        Ok(())
    }
}

/// A PR fixture with the given labels and changed files.
pub fn pull_request(number: u64, labels: &[&str], changed_files: &[&str]) -> PullRequest {
    PullRequest {
        number,
        title: format!("PR #{number}"),
        source_branch: "develop".to_string(),
        head_sha: "0123456789abcdef0123456789abcdef01234567".to_string(),
        labels: labels.iter().map(|s| s.to_string()).collect(),
        changed_files: changed_files.iter().map(|s| s.to_string()).collect(),
    }
}
