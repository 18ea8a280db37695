//! GitOps manifest propagation.
//!
//! Takes a merged PR, discovers its kubernetes targets, and lands the
//! built manifest in the manifests repository behind auto-merging pull
//! requests. Per-target failures are recorded and do not cancel the
//! remaining targets; only extraction failure is fatal for the call.

pub mod request;

pub use request::ManifestUpdateRequest;

use std::fs;
use std::path::PathBuf;

use anyhow::Context;

use crate::branch;
use crate::config::WorkflowConfig;
use crate::discovery;
use crate::error::{PipelineError, Result};
use crate::label::{DeployLabel, LABEL_PREFIX, Stack};
use crate::vcs::{self, NewPullRequest, VcsGateway};

/// A kubernetes deploy target discovered from a PR's changed files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubernetesTarget {
    pub service: String,
    pub environment: String,
    pub manifest_path: String,
}

/// Deployment information extracted from a merged PR.
#[derive(Debug, Clone)]
pub struct DeploymentInfo {
    pub pr_number: u64,
    pub deploy_labels: Vec<DeployLabel>,
    pub target_environment: String,
    pub kubernetes_targets: Vec<KubernetesTarget>,
    pub source_branch: String,
    pub source_sha: String,
}

/// Inputs for one `update_from_pr` call.
#[derive(Debug, Clone)]
pub struct UpdateFromPrRequest {
    pub pr_number: u64,
    pub manifest_file: PathBuf,
    pub target_repo: String,
    pub target_branch: String,
    pub service: Option<String>,
    pub environment: Option<String>,
    pub source_repo: String,
}

/// Per-target outcome; failures are recorded, not raised.
#[derive(Debug, Clone)]
pub struct ManifestUpdateOutcome {
    pub service: String,
    pub environment: String,
    pub has_changes: bool,
    pub pull_request_url: Option<String>,
    pub error: Option<String>,
}

impl ManifestUpdateOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated result over all processed targets.
#[derive(Debug, Clone, Default)]
pub struct ManifestUpdateReport {
    pub processed_targets: usize,
    pub has_changes: bool,
    pub results: Vec<ManifestUpdateOutcome>,
}

/// What a dry run would do, with names identical to the real run's.
#[derive(Debug, Clone)]
pub struct DryRunReport {
    pub pr_number: u64,
    pub service: String,
    pub environment: String,
    pub deploy_label: String,
    pub target_environment: String,
    pub feature_branch: String,
    pub target_file: String,
    pub manifest_file: PathBuf,
}

pub struct ManifestUpdateOrchestrator<'a> {
    vcs: &'a dyn VcsGateway,
    config: &'a WorkflowConfig,
}

impl<'a> ManifestUpdateOrchestrator<'a> {
    pub fn new(vcs: &'a dyn VcsGateway, config: &'a WorkflowConfig) -> Self {
        Self { vcs, config }
    }

    /// Extract labels, environment, kubernetes targets and source commit
    /// from the PR. Failure here is fatal for the whole update.
    pub fn extract_deployment_info(
        &self,
        pr_number: u64,
        target_branch: &str,
    ) -> Result<DeploymentInfo> {
        let pr = self
            .vcs
            .pull_request(pr_number)
            .map_err(|err| PipelineError::Extraction(format!("{err:#}")))?;

        let target_environment = branch::target_environment(target_branch, self.config)?;
        let deploy_labels = vcs::deploy_labels_from(&pr.labels, &target_environment);
        if deploy_labels.is_empty() {
            return Err(PipelineError::Extraction(format!(
                "No deploy labels found in PR #{pr_number}"
            )));
        }

        let kubernetes_targets = self.scan_targets(&pr.changed_files, &target_environment);
        if kubernetes_targets.is_empty() {
            return Err(PipelineError::NotFound(format!(
                "No kubernetes deployment targets found for PR #{pr_number}"
            )));
        }

        Ok(DeploymentInfo {
            pr_number,
            deploy_labels,
            target_environment,
            kubernetes_targets,
            source_branch: pr.source_branch,
            source_sha: pr.head_sha,
        })
    }

    /// Update manifests for every discovered target, or the single
    /// `(service, environment)` target when both were requested.
    ///
    /// The call succeeds whenever extraction succeeded; per-target
    /// failures travel in the report instead of aborting the batch.
    pub fn update_from_pr(&self, req: &UpdateFromPrRequest) -> Result<ManifestUpdateReport> {
        let info = self.extract_deployment_info(req.pr_number, &req.target_branch)?;
        let targets = narrow_targets(
            info.kubernetes_targets.clone(),
            req.service.as_deref(),
            req.environment.as_deref(),
        )?;

        let manifest_content = fs::read_to_string(&req.manifest_file);

        let mut report = ManifestUpdateReport::default();
        for target in &targets {
            let outcome = match &manifest_content {
                Ok(content) => self.process_target(target, req, &info, content),
                Err(err) => ManifestUpdateOutcome {
                    service: target.service.clone(),
                    environment: target.environment.clone(),
                    has_changes: false,
                    pull_request_url: None,
                    error: Some(format!(
                        "Failed to read manifest file {}: {err}",
                        req.manifest_file.display()
                    )),
                },
            };
            if outcome.has_changes {
                report.has_changes = true;
            }
            report.results.push(outcome);
        }
        report.processed_targets = report.results.len();
        Ok(report)
    }

    /// Validate what `update_from_pr` would do, without writing anything.
    ///
    /// Checks the manifest file, the PR's `deploy:<service>` label, the
    /// environment resolved from the target branch, and the kubernetes
    /// target match, then reports the derived names.
    pub fn dry_run(&self, req: &UpdateFromPrRequest) -> Result<DryRunReport> {
        let (Some(service), Some(environment)) =
            (req.service.as_deref(), req.environment.as_deref())
        else {
            return Err(PipelineError::Configuration(
                "service and environment are required for a dry run".to_string(),
            ));
        };

        if !req.manifest_file.exists() {
            return Err(PipelineError::NotFound(format!(
                "Manifest file not found: {}",
                req.manifest_file.display()
            )));
        }
        let content = fs::read_to_string(&req.manifest_file).map_err(|err| {
            PipelineError::NotFound(format!(
                "Manifest file not readable: {} ({err})",
                req.manifest_file.display()
            ))
        })?;
        if content.trim().is_empty() {
            return Err(PipelineError::Extraction(format!(
                "Manifest file is empty: {}",
                req.manifest_file.display()
            )));
        }

        let pr = self
            .vcs
            .pull_request(req.pr_number)
            .map_err(|err| PipelineError::Extraction(format!("{err:#}")))?;
        let wanted = format!("{LABEL_PREFIX}{service}");
        if !pr.labels.iter().any(|label| label == &wanted) {
            return Err(PipelineError::NotFound(format!(
                "PR #{} does not carry the {wanted} label",
                req.pr_number
            )));
        }

        let target_environment = branch::target_environment(&req.target_branch, self.config)?;
        if target_environment != environment {
            return Err(PipelineError::EnvironmentMismatch(format!(
                "PR #{} resolves to environment '{target_environment}', requested '{environment}'",
                req.pr_number
            )));
        }

        // Same target matching as the real run.
        let targets = self.scan_targets(&pr.changed_files, &target_environment);
        narrow_targets(targets, Some(service), Some(environment))?;

        let request = ManifestUpdateRequest {
            service: service.to_string(),
            environment: environment.to_string(),
            manifest_file: req.manifest_file.clone(),
            target_repo: req.target_repo.clone(),
            target_branch: req.target_branch.clone(),
            source_sha: pr.head_sha.clone(),
            source_repo: req.source_repo.clone(),
            pr_number: Some(req.pr_number),
        };

        Ok(DryRunReport {
            pr_number: req.pr_number,
            service: service.to_string(),
            environment: environment.to_string(),
            deploy_label: wanted,
            target_environment,
            feature_branch: request.feature_branch_name(),
            target_file: request.target_file_path(),
            manifest_file: req.manifest_file.clone(),
        })
    }

    /// Changed paths matching the kubernetes directory convention, one
    /// target per distinct (service, environment). A convention without an
    /// `{environment}` placeholder inherits the resolved target
    /// environment.
    fn scan_targets(
        &self,
        changed_files: &[String],
        target_environment: &str,
    ) -> Vec<KubernetesTarget> {
        let Some(template) = self.config.directory_conventions.for_stack(Stack::Kubernetes)
        else {
            return Vec::new();
        };
        let Some(matcher) = discovery::target_matcher(template) else {
            return Vec::new();
        };

        let mut targets: Vec<KubernetesTarget> = Vec::new();
        for file in changed_files {
            let Some(captures) = matcher.captures(file) else {
                continue;
            };
            let service = captures["service"].to_string();
            if service.starts_with('.') {
                continue;
            }
            let environment = captures
                .name("environment")
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| target_environment.to_string());
            if targets
                .iter()
                .any(|t| t.service == service && t.environment == environment)
            {
                continue;
            }
            targets.push(KubernetesTarget {
                service,
                environment,
                manifest_path: file.clone(),
            });
        }
        targets
    }

    fn process_target(
        &self,
        target: &KubernetesTarget,
        req: &UpdateFromPrRequest,
        info: &DeploymentInfo,
        content: &str,
    ) -> ManifestUpdateOutcome {
        let request = ManifestUpdateRequest {
            service: target.service.clone(),
            environment: target.environment.clone(),
            manifest_file: req.manifest_file.clone(),
            target_repo: req.target_repo.clone(),
            target_branch: req.target_branch.clone(),
            source_sha: info.source_sha.clone(),
            source_repo: req.source_repo.clone(),
            pr_number: Some(req.pr_number),
        };

        match self.land_manifest(&request, content) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(
                    service = %target.service,
                    environment = %target.environment,
                    "manifest update failed: {err:#}"
                );
                ManifestUpdateOutcome {
                    service: target.service.clone(),
                    environment: target.environment.clone(),
                    has_changes: false,
                    pull_request_url: None,
                    error: Some(format!("{err:#}")),
                }
            }
        }
    }

    fn land_manifest(
        &self,
        request: &ManifestUpdateRequest,
        content: &str,
    ) -> anyhow::Result<ManifestUpdateOutcome> {
        request.validate()?;

        let branch_name = request.feature_branch_name();
        let has_changes = self
            .vcs
            .write_repo_file(
                &request.target_repo,
                &branch_name,
                &request.target_branch,
                &request.target_file_path(),
                content,
                &request.commit_message(),
            )
            .context("Failed to update manifest file")?;

        if !has_changes {
            return Ok(ManifestUpdateOutcome {
                service: request.service.clone(),
                environment: request.environment.clone(),
                has_changes: false,
                pull_request_url: None,
                error: None,
            });
        }

        let created = self
            .vcs
            .create_pull_request(&NewPullRequest {
                repo: request.target_repo.clone(),
                base: request.target_branch.clone(),
                head: branch_name,
                title: request.pull_request_title(),
                body: request.pull_request_body(),
                labels: request.pull_request_labels(),
            })
            .context("Failed to create pull request")?;
        self.vcs
            .enable_auto_merge(&request.target_repo, created.number, "squash")
            .context("Failed to enable auto-merge")?;

        Ok(ManifestUpdateOutcome {
            service: request.service.clone(),
            environment: request.environment.clone(),
            has_changes: true,
            pull_request_url: Some(created.url),
            error: None,
        })
    }
}

fn narrow_targets(
    targets: Vec<KubernetesTarget>,
    service: Option<&str>,
    environment: Option<&str>,
) -> Result<Vec<KubernetesTarget>> {
    let (Some(service), Some(environment)) = (service, environment) else {
        return Ok(targets);
    };
    let narrowed: Vec<KubernetesTarget> = targets
        .into_iter()
        .filter(|target| target.service == service && target.environment == environment)
        .collect();
    if narrowed.is_empty() {
        return Err(PipelineError::NotFound(format!(
            "No kubernetes target found for {service}:{environment}"
        )));
    }
    Ok(narrowed)
}
