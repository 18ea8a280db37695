//! Tests for the deployment safety gate.

use gantry_core::config::SafetyChecks;
use gantry_core::label::DeployLabel;
use gantry_core::safety::{self, SafetyInput, SafetyStatus};

fn input<'a>(
    labels: &'a [DeployLabel],
    merged_pr_number: Option<u64>,
    branch: &'a str,
    attempt: u32,
) -> SafetyInput<'a> {
    SafetyInput {
        labels,
        merged_pr_number,
        branch,
        attempt,
    }
}

#[test]
fn passes_with_merged_pr_present() {
    let checks = SafetyChecks {
        require_merged_pr: true,
        fail_on_missing_pr: true,
        ..SafetyChecks::default()
    };
    let labels = [DeployLabel::new("orders", "staging")];

    let report = safety::validate(&input(&labels, Some(42), "staging/orders", 1), &checks);
    assert!(report.passed());
    assert!(report.reasons.is_empty());
}

#[test]
fn missing_pr_is_a_warning_until_escalated() {
    let checks = SafetyChecks {
        require_merged_pr: true,
        fail_on_missing_pr: false,
        ..SafetyChecks::default()
    };

    let report = safety::validate(&input(&[], None, "develop", 1), &checks);
    assert!(report.passed());
    assert_eq!(report.warnings.len(), 1);

    let escalated = SafetyChecks {
        fail_on_missing_pr: true,
        ..checks
    };
    let report = safety::validate(&input(&[], None, "develop", 1), &escalated);
    assert_eq!(report.status, SafetyStatus::Fail);
    assert!(report.reasons[0].contains("merged_pr_requirement"));
}

#[test]
fn direct_push_requires_allowlisted_branch() {
    let checks = SafetyChecks {
        allowed_direct_push_branches: vec!["develop".to_string()],
        ..SafetyChecks::default()
    };

    let allowed = safety::validate(&input(&[], None, "develop", 1), &checks);
    assert!(allowed.passed());

    let denied = safety::validate(&input(&[], None, "staging/orders", 1), &checks);
    assert!(!denied.passed());
    assert!(denied.reasons[0].contains("direct_push_allowlist"));

    // a merged PR satisfies the check regardless of the branch
    let merged = safety::validate(&input(&[], Some(7), "staging/orders", 1), &checks);
    assert!(merged.passed());
}

#[test]
fn empty_allowlist_disables_the_check() {
    let checks = SafetyChecks::default();
    let report = safety::validate(&input(&[], None, "any-branch", 1), &checks);
    assert!(report.passed());
}

#[test]
fn attempts_beyond_the_limit_fail() {
    let checks = SafetyChecks {
        max_retry_attempts: 2,
        ..SafetyChecks::default()
    };

    assert!(safety::validate(&input(&[], None, "develop", 2), &checks).passed());
    let report = safety::validate(&input(&[], None, "develop", 3), &checks);
    assert!(!report.passed());
    assert!(report.reasons[0].contains("retry limit"));

    let disabled = SafetyChecks {
        max_retry_attempts: 0,
        ..checks
    };
    assert!(safety::validate(&input(&[], None, "develop", 99), &disabled).passed());
}

#[test]
fn reasons_accumulate_across_failing_checks() {
    let checks = SafetyChecks {
        require_merged_pr: true,
        fail_on_missing_pr: true,
        max_retry_attempts: 1,
        allowed_direct_push_branches: vec!["develop".to_string()],
    };

    let report = safety::validate(&input(&[], None, "staging/orders", 5), &checks);
    assert_eq!(report.status, SafetyStatus::Fail);
    // every violation is reported, not just the first
    assert_eq!(report.reasons.len(), 3);
}

#[test]
fn empty_label_set_is_not_a_violation() {
    let checks = SafetyChecks::default();
    let report = safety::validate(&input(&[], Some(42), "develop", 1), &checks);
    assert!(report.passed());
    assert!(
        report
            .checks
            .iter()
            .any(|check| check.check == "labels_presence" && check.passed)
    );
}
