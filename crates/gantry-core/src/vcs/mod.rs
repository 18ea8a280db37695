//! Version-control platform gateway.

pub mod github;

pub use github::GithubClient;

use crate::error::{PipelineError, Result};
use crate::label::{DeployLabel, LABEL_PREFIX};

/// Pull request details surfaced to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub source_branch: String,
    pub head_sha: String,
    pub labels: Vec<String>,
    pub changed_files: Vec<String>,
}

/// Inputs for opening a pull request against a manifests repository.
#[derive(Debug, Clone)]
pub struct NewPullRequest {
    pub repo: String,
    pub base: String,
    pub head: String,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedPullRequest {
    pub number: u64,
    pub url: String,
}

/// Remote operations the pipeline needs from the hosting platform.
///
/// Implementations are expected to be thin; retry and rate-limit policy
/// belongs to the invoking workflow.
pub trait VcsGateway {
    /// The merged pull request whose merge produced `sha` on `branch`,
    /// if any. `Ok(None)` means "no PR found", distinct from failure.
    fn find_merged_pr(&self, branch: &str, sha: &str) -> anyhow::Result<Option<PullRequest>>;

    fn pull_request(&self, number: u64) -> anyhow::Result<PullRequest>;

    fn labels_for_pr(&self, number: u64) -> anyhow::Result<Vec<String>>;

    /// Create the label repository-side when absent. Idempotent.
    fn ensure_label_exists(&self, name: &str) -> anyhow::Result<()>;

    fn add_label(&self, number: u64, label: &str) -> anyhow::Result<()>;

    fn remove_label(&self, number: u64, label: &str) -> anyhow::Result<()>;

    /// Create or update the comment marked with `tag` on the pull request.
    fn upsert_tagged_comment(&self, number: u64, content: &str, tag: &str) -> anyhow::Result<()>;

    /// Write `content` to `path` on `branch` of `repo`, creating the
    /// branch from `base_branch` when missing. Returns whether the file
    /// content actually changed.
    fn write_repo_file(
        &self,
        repo: &str,
        branch: &str,
        base_branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> anyhow::Result<bool>;

    fn create_pull_request(&self, req: &NewPullRequest) -> anyhow::Result<CreatedPullRequest>;

    fn enable_auto_merge(&self, repo: &str, number: u64, merge_method: &str)
    -> anyhow::Result<()>;
}

/// Labels resolved from the merged pull request behind a commit.
#[derive(Debug, Clone, Default)]
pub struct MergedPrLabels {
    pub deploy_labels: Vec<DeployLabel>,
    pub merged_pr_number: Option<u64>,
    pub source_branch: Option<String>,
    pub head_sha: Option<String>,
}

/// Resolve the merged PR behind `sha` on `branch` and collect its deploy
/// labels, bound to `environment` from the branch context.
///
/// "No PR found" is a successful empty result; whether that is acceptable
/// is decided by the safety validator, not here.
pub fn fetch_merged_pr_labels(
    vcs: &dyn VcsGateway,
    branch: &str,
    sha: &str,
    environment: &str,
) -> Result<MergedPrLabels> {
    let pr = vcs.find_merged_pr(branch, sha).map_err(PipelineError::vcs)?;
    Ok(match pr {
        Some(pr) => MergedPrLabels {
            deploy_labels: deploy_labels_from(&pr.labels, environment),
            merged_pr_number: Some(pr.number),
            source_branch: Some(pr.source_branch),
            head_sha: Some(pr.head_sha),
        },
        None => MergedPrLabels::default(),
    })
}

/// Deploy labels among a PR's label names, bound to the given environment.
pub fn deploy_labels_from(labels: &[String], environment: &str) -> Vec<DeployLabel> {
    labels
        .iter()
        .filter_map(|label| DeployLabel::parse(label, environment))
        .collect()
}

/// The `deploy:`-prefixed subset of a PR's label names.
pub fn deploy_label_names(labels: &[String]) -> Vec<String> {
    labels
        .iter()
        .filter(|label| label.starts_with(LABEL_PREFIX))
        .cloned()
        .collect()
}
