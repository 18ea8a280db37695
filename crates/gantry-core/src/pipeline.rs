//! Pipeline controllers sequencing the deployment stages.
//!
//! One branch push or PR event drives exactly one linear pass; nothing
//! here retries or holds state between invocations. Unexpected gateway
//! errors are folded into the failure-result shape at this boundary with
//! the underlying message preserved.

use serde_json::json;

use crate::branch;
use crate::config::WorkflowConfig;
use crate::discovery::{ExcludedService, ServiceDiscovery};
use crate::error::{PipelineError, Result};
use crate::filter;
use crate::git::{GitClient, UNKNOWN_COMMIT};
use crate::label::{DeployLabel, LABEL_PREFIX};
use crate::matrix::{self, DeploymentMatrix};
use crate::output::OutputSink;
use crate::reconcile::{self, ReconcileReport};
use crate::safety::{self, SafetyInput, SafetyReport};
use crate::vcs::{self, VcsGateway};

/// Which label set feeds matrix generation.
///
/// The environment filter always runs for safety validation; this only
/// chooses whether the matrix sees the filtered set (default) or every
/// fetched label, surfacing deployments beyond the current environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatrixScope {
    #[default]
    FilteredToEnvironment,
    AllLabels,
}

/// Options for a branch-push trigger.
#[derive(Debug, Clone)]
pub struct TriggerOptions {
    pub branch: String,
    /// Commit that triggered the run; falls back to local HEAD, then the
    /// "unknown" sentinel.
    pub commit: Option<String>,
    /// Pipeline entry count for this commit, supplied by the scheduler.
    pub attempt: u32,
    pub matrix_scope: MatrixScope,
}

impl TriggerOptions {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            commit: None,
            attempt: 1,
            matrix_scope: MatrixScope::default(),
        }
    }
}

/// Everything a CI execution step needs from one trigger pass.
#[derive(Debug, Clone)]
pub struct TriggerReport {
    pub branch: String,
    pub target_environment: String,
    /// Labels for the target environment (post-filter).
    pub deploy_labels: Vec<DeployLabel>,
    pub merged_pr_number: Option<u64>,
    pub safety: SafetyReport,
    pub matrix: DeploymentMatrix,
}

pub struct DeployTrigger<'a> {
    config: &'a WorkflowConfig,
    vcs: &'a dyn VcsGateway,
    git: Option<&'a GitClient>,
    workdir: std::path::PathBuf,
}

impl<'a> DeployTrigger<'a> {
    pub fn new(config: &'a WorkflowConfig, vcs: &'a dyn VcsGateway) -> Self {
        Self {
            config,
            vcs,
            git: None,
            workdir: std::path::PathBuf::from("."),
        }
    }

    pub fn with_git(mut self, git: &'a GitClient) -> Self {
        self.git = Some(git);
        self
    }

    /// Root under which develop working directories are checked.
    pub fn with_workdir(mut self, workdir: impl Into<std::path::PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Branch push entry point: environment, labels (merged PR, or the
    /// branch itself for direct pushes), filter, safety gate, matrix,
    /// emit.
    pub fn trigger_from_branch(
        &self,
        opts: &TriggerOptions,
        sink: &mut dyn OutputSink,
    ) -> Result<TriggerReport> {
        self.probe_working_tree();

        let target_environment = branch::target_environment(&opts.branch, self.config)?;
        let commit = self.resolve_commit(opts.commit.as_deref());

        let fetched =
            vcs::fetch_merged_pr_labels(self.vcs, &opts.branch, &commit, &target_environment)?;
        let deploy_labels = if fetched.merged_pr_number.is_some() {
            fetched.deploy_labels.clone()
        } else {
            // Direct pushes carry no PR labels; the branch name itself
            // expresses the deploy intent.
            branch::labels_for_branch(
                &opts.branch,
                &self.local_changes(),
                self.config,
                &self.workdir,
            )
        };
        let filtered = filter::by_environment(&deploy_labels, &target_environment);

        let safety = safety::validate(
            &SafetyInput {
                labels: &filtered.filtered,
                merged_pr_number: fetched.merged_pr_number,
                branch: &opts.branch,
                attempt: opts.attempt,
            },
            &self.config.safety_checks,
        );
        if !safety.passed() {
            return Err(PipelineError::SafetyViolation {
                reasons: safety.reasons,
            });
        }

        let matrix_input = match opts.matrix_scope {
            MatrixScope::FilteredToEnvironment => &filtered.filtered,
            MatrixScope::AllLabels => &deploy_labels,
        };
        let matrix = matrix::generate(matrix_input, self.config);

        let report = TriggerReport {
            branch: opts.branch.clone(),
            target_environment,
            deploy_labels: filtered.filtered,
            merged_pr_number: fetched.merged_pr_number,
            safety,
            matrix,
        };
        emit_trigger(&report, sink).map_err(PipelineError::output)?;
        Ok(report)
    }

    /// PR entry point: labels and source branch come from the PR itself.
    ///
    /// Labels fetched here already carry the branch-resolved environment,
    /// so the filtered and unfiltered sets coincide.
    pub fn trigger_from_pr(
        &self,
        pr_number: u64,
        attempt: u32,
        sink: &mut dyn OutputSink,
    ) -> Result<TriggerReport> {
        let pr = self
            .vcs
            .pull_request(pr_number)
            .map_err(PipelineError::vcs)?;
        let target_environment = branch::target_environment(&pr.source_branch, self.config)?;
        let deploy_labels = vcs::deploy_labels_from(&pr.labels, &target_environment);

        let safety = safety::validate(
            &SafetyInput {
                labels: &deploy_labels,
                merged_pr_number: Some(pr_number),
                branch: &pr.source_branch,
                attempt,
            },
            &self.config.safety_checks,
        );
        if !safety.passed() {
            return Err(PipelineError::SafetyViolation {
                reasons: safety.reasons,
            });
        }

        let matrix = matrix::generate(&deploy_labels, self.config);
        let report = TriggerReport {
            branch: pr.source_branch,
            target_environment,
            deploy_labels,
            merged_pr_number: Some(pr_number),
            safety,
            matrix,
        };
        emit_trigger(&report, sink).map_err(PipelineError::output)?;
        Ok(report)
    }

    fn resolve_commit(&self, commit: Option<&str>) -> String {
        if let Some(commit) = commit {
            return commit.to_string();
        }
        match self.git {
            Some(git) => git.head_sha(),
            None => UNKNOWN_COMMIT.to_string(),
        }
    }

    fn local_changes(&self) -> Vec<String> {
        match self.git {
            Some(git) => git.changed_files(None, None).unwrap_or_else(|err| {
                tracing::warn!("could not read local changes: {err:#}");
                Vec::new()
            }),
            None => Vec::new(),
        }
    }

    // Diagnostic only; a dirty tree is worth a warning, never an abort.
    fn probe_working_tree(&self) {
        if let Some(git) = self.git {
            match git.is_clean() {
                Ok(true) => {}
                Ok(false) => tracing::warn!("working tree has uncommitted changes"),
                Err(err) => tracing::warn!("could not check working tree state: {err:#}"),
            }
        }
    }
}

fn emit_trigger(report: &TriggerReport, sink: &mut dyn OutputSink) -> anyhow::Result<()> {
    let label_strings: Vec<String> = report
        .deploy_labels
        .iter()
        .map(DeployLabel::label_string)
        .collect();

    sink.emit(
        "DEPLOYMENT_TARGETS",
        &serde_json::to_string(&report.matrix.items)?,
    )?;
    sink.emit(
        "HAS_TARGETS",
        if report.matrix.has_deployments() {
            "true"
        } else {
            "false"
        },
    )?;
    sink.emit("DEPLOY_LABELS", &serde_json::to_string(&label_strings)?)?;
    sink.emit("TARGET_ENVIRONMENT", &report.target_environment)?;
    sink.emit("BRANCH_NAME", &report.branch)?;
    if let Some(number) = report.merged_pr_number {
        sink.emit("MERGED_PR_NUMBER", &number.to_string())?;
    }
    sink.emit("SAFETY_STATUS", report.safety.status.as_str())?;
    Ok(())
}

/// Result of converging a PR's labels with its changed files.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub services: Vec<String>,
    pub excluded: Vec<ExcludedService>,
    pub deploy_labels: Vec<String>,
    pub changed_files: Vec<String>,
    pub reconcile: ReconcileReport,
}

pub struct LabelDispatcher<'a> {
    config: &'a WorkflowConfig,
    vcs: &'a dyn VcsGateway,
    git: Option<&'a GitClient>,
}

impl<'a> LabelDispatcher<'a> {
    pub fn new(config: &'a WorkflowConfig, vcs: &'a dyn VcsGateway) -> Self {
        Self {
            config,
            vcs,
            git: None,
        }
    }

    pub fn with_git(mut self, git: &'a GitClient) -> Self {
        self.git = Some(git);
        self
    }

    /// Detect changed services and converge the PR's deploy labels.
    pub fn dispatch(&self, pr_number: u64, sink: &mut dyn OutputSink) -> Result<DispatchReport> {
        let pr = self
            .vcs
            .pull_request(pr_number)
            .map_err(PipelineError::vcs)?;
        let changed_files = if pr.changed_files.is_empty() {
            self.local_changes()
        } else {
            pr.changed_files
        };

        let discovery = ServiceDiscovery::new(self.config).discover(&changed_files);
        for excluded in &discovery.excluded {
            tracing::warn!(
                service = %excluded.service,
                kind = %excluded.kind,
                reason = %excluded.reason,
                "service excluded from automation"
            );
        }

        let required: Vec<String> = discovery
            .services
            .iter()
            .map(|service| format!("{LABEL_PREFIX}{service}"))
            .collect();
        let reconcile_report =
            reconcile::reconcile(self.vcs, pr_number, &required).map_err(PipelineError::vcs)?;

        // The summary comment is informational; its failure never fails
        // the dispatch.
        if let Err(err) = reconcile::post_summary_comment(
            self.vcs,
            pr_number,
            &discovery.services,
            &required,
            &changed_files,
        ) {
            tracing::warn!("failed to update deployment comment: {err:#}");
        }

        let report = DispatchReport {
            services: discovery.services,
            excluded: discovery.excluded,
            deploy_labels: required,
            changed_files,
            reconcile: reconcile_report,
        };
        emit_dispatch(&report, sink).map_err(PipelineError::output)?;
        Ok(report)
    }

    fn local_changes(&self) -> Vec<String> {
        match self.git {
            Some(git) => git.changed_files(None, None).unwrap_or_else(|err| {
                tracing::warn!("could not read local changes: {err:#}");
                Vec::new()
            }),
            None => Vec::new(),
        }
    }
}

fn emit_dispatch(report: &DispatchReport, sink: &mut dyn OutputSink) -> anyhow::Result<()> {
    sink.emit(
        "DEPLOY_LABELS",
        &serde_json::to_string(&report.deploy_labels)?,
    )?;
    sink.emit(
        "LABELS_ADDED",
        &serde_json::to_string(&report.reconcile.labels_added)?,
    )?;
    sink.emit(
        "LABELS_REMOVED",
        &serde_json::to_string(&report.reconcile.labels_removed)?,
    )?;
    sink.emit(
        "HAS_CHANGES",
        &json!(!report.deploy_labels.is_empty()).to_string(),
    )?;
    sink.emit(
        "CHANGED_FILES",
        &serde_json::to_string(&report.changed_files)?,
    )?;
    sink.emit(
        "SERVICES_DETECTED",
        &serde_json::to_string(&report.services)?,
    )?;
    Ok(())
}
