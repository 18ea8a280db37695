//! Policy gate evaluated before trusting a deployment matrix.

use serde::Serialize;

use crate::config::SafetyChecks;
use crate::label::DeployLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyStatus {
    Pass,
    Fail,
}

impl SafetyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyStatus::Pass => "pass",
            SafetyStatus::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafetyCheckResult {
    pub check: &'static str,
    pub passed: bool,
    pub message: String,
}

/// Outcome of all enabled checks. Reasons accumulate rather than
/// short-circuit, so operators see every violation at once.
#[derive(Debug, Clone)]
pub struct SafetyReport {
    pub status: SafetyStatus,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
    pub checks: Vec<SafetyCheckResult>,
}

impl SafetyReport {
    pub fn passed(&self) -> bool {
        self.status == SafetyStatus::Pass
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SafetyInput<'a> {
    pub labels: &'a [DeployLabel],
    pub merged_pr_number: Option<u64>,
    pub branch: &'a str,
    /// How many times this commit/branch has entered the pipeline.
    /// Supplied by the invoking scheduler; the validator keeps no state.
    pub attempt: u32,
}

/// Evaluate the enabled checks in declaration order. Any failing check
/// fails the validation as a whole.
pub fn validate(input: &SafetyInput<'_>, checks: &SafetyChecks) -> SafetyReport {
    let mut report = SafetyReport {
        status: SafetyStatus::Pass,
        reasons: Vec::new(),
        warnings: Vec::new(),
        checks: Vec::new(),
    };

    if checks.require_merged_pr {
        match input.merged_pr_number {
            Some(number) => record(
                &mut report,
                "merged_pr_requirement",
                true,
                format!("Merged PR #{number} found"),
            ),
            None => {
                let message =
                    "No merged PR found - deployment may be from direct push".to_string();
                if checks.fail_on_missing_pr {
                    record(&mut report, "merged_pr_requirement", false, message);
                } else {
                    warn(&mut report, "merged_pr_requirement", message);
                }
            }
        }
    }

    // The allow-list only constrains when configured; an empty list leaves
    // the check disabled rather than forbidding every branch.
    if !checks.allowed_direct_push_branches.is_empty() && input.merged_pr_number.is_none() {
        let allowed = checks
            .allowed_direct_push_branches
            .iter()
            .any(|branch| branch == input.branch);
        record(
            &mut report,
            "direct_push_allowlist",
            allowed,
            if allowed {
                format!("Branch '{}' may deploy without a merged PR", input.branch)
            } else {
                format!(
                    "Branch '{}' is not allowed to deploy without a merged PR",
                    input.branch
                )
            },
        );
    }

    if checks.max_retry_attempts > 0 && input.attempt > checks.max_retry_attempts {
        record(
            &mut report,
            "max_retry_attempts",
            false,
            format!(
                "Attempt {} exceeds the retry limit of {}",
                input.attempt, checks.max_retry_attempts
            ),
        );
    }

    // Services without deployment labels are normal; recorded for
    // visibility only.
    record(
        &mut report,
        "labels_presence",
        true,
        if input.labels.is_empty() {
            "No deployment labels provided".to_string()
        } else {
            format!("{} deployment labels found", input.labels.len())
        },
    );

    report
}

fn record(report: &mut SafetyReport, check: &'static str, passed: bool, message: String) {
    if !passed {
        report.status = SafetyStatus::Fail;
        report.reasons.push(format!("{check}: {message}"));
    }
    report.checks.push(SafetyCheckResult {
        check,
        passed,
        message,
    });
}

fn warn(report: &mut SafetyReport, check: &'static str, message: String) {
    tracing::warn!(check, "{message}");
    report.warnings.push(format!("{check}: {message}"));
    report.checks.push(SafetyCheckResult {
        check,
        passed: true,
        message,
    });
}
