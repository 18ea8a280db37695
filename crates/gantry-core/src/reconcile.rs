//! Converges a pull request's deploy labels to a desired set.

use anyhow::Context;

use crate::label::LABEL_PREFIX;
use crate::vcs::VcsGateway;

/// Tag marking the auto-maintained deployment comment.
pub const DEPLOYMENT_COMMENT_TAG: &str = "auto-deployment-info";

// Beyond this many changed files the comment collapses them.
const COLLAPSE_FILE_LIST_AT: usize = 20;

/// What changed during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub labels_added: Vec<String>,
    pub labels_removed: Vec<String>,
    pub final_labels: Vec<String>,
}

/// Bring the PR's deploy labels in line with `required`.
///
/// Required labels are created repository-side before anything touches the
/// PR, and removals are applied before additions so the PR never carries
/// conflicting deploy intents at once. The two phases are not
/// transactional; reconciliation is safe to re-run instead. Running twice
/// with identical input is a no-op the second time.
pub fn reconcile(
    vcs: &dyn VcsGateway,
    pr_number: u64,
    required: &[String],
) -> anyhow::Result<ReconcileReport> {
    let current: Vec<String> = vcs
        .labels_for_pr(pr_number)
        .context("Failed to get PR labels")?
        .into_iter()
        .filter(|label| label.starts_with(LABEL_PREFIX))
        .collect();

    let labels_to_add: Vec<String> = required
        .iter()
        .filter(|label| !current.contains(label))
        .cloned()
        .collect();
    let labels_to_remove: Vec<String> = current
        .iter()
        .filter(|label| !required.contains(label))
        .cloned()
        .collect();

    for label in required {
        vcs.ensure_label_exists(label)
            .with_context(|| format!("Failed to ensure label exists {label}"))?;
    }
    for label in &labels_to_remove {
        vcs.remove_label(pr_number, label)
            .with_context(|| format!("Failed to remove label {label}"))?;
    }
    for label in &labels_to_add {
        vcs.add_label(pr_number, label)
            .with_context(|| format!("Failed to add label {label}"))?;
    }

    Ok(ReconcileReport {
        labels_added: labels_to_add,
        labels_removed: labels_to_remove,
        final_labels: required.to_vec(),
    })
}

/// Upsert the deployment summary comment on the PR.
pub fn post_summary_comment(
    vcs: &dyn VcsGateway,
    pr_number: u64,
    services: &[String],
    labels: &[String],
    changed_files: &[String],
) -> anyhow::Result<()> {
    let content = summary_comment(services, labels, changed_files);
    vcs.upsert_tagged_comment(pr_number, &content, DEPLOYMENT_COMMENT_TAG)
        .context("Failed to update PR comment")
}

fn summary_comment(services: &[String], labels: &[String], changed_files: &[String]) -> String {
    let mut content = String::from("## Auto-Deployment Information\n\n");

    if services.is_empty() {
        content.push_str("No deployment targets detected for this PR.\n");
    } else {
        content.push_str("### Detected Services\n");
        for service in services {
            content.push_str(&format!("- **{service}**\n"));
        }
        content.push_str("\n### Deployment Labels Applied\n");
        for label in labels {
            content.push_str(&format!("- `{label}`\n"));
        }
    }

    content.push_str(&format!("\n### Changed Files ({})\n", changed_files.len()));
    if changed_files.len() > COLLAPSE_FILE_LIST_AT {
        content.push_str(&format!(
            "<details>\n<summary>Show all {} changed files</summary>\n\n",
            changed_files.len()
        ));
        for file in changed_files {
            content.push_str(&format!("- `{file}`\n"));
        }
        content.push_str("\n</details>\n");
    } else {
        for file in changed_files {
            content.push_str(&format!("- `{file}`\n"));
        }
    }

    content.push_str("\n---\n*This comment is automatically updated when the PR changes.*");
    content
}
