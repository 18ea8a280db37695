//! Deployment matrix generation.
//!
//! A pure function from labels and configuration to the fully-resolved,
//! credential-and-path-complete target list handed to CI. No network or
//! filesystem access.

use serde::Serialize;

use crate::config::{WorkflowConfig, expand_template};
use crate::label::{DeployLabel, Stack};

/// One fully-resolved deploy target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentMatrixItem {
    pub service: String,
    pub environment: String,
    pub stack: Stack,
    pub aws_region: String,
    pub working_directory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iam_role_plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iam_role_apply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terraform_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terragrunt_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentMatrix {
    pub items: Vec<DeploymentMatrixItem>,
}

impl DeploymentMatrix {
    pub fn has_deployments(&self) -> bool {
        !self.items.is_empty()
    }
}

/// Resolve each valid label against the environment table and directory
/// conventions.
///
/// A label whose environment or convention lookup is absent is omitted
/// from the output without error or warning; this silent-omission policy
/// is deliberate and asserted by tests. Output order follows input order.
pub fn generate(labels: &[DeployLabel], config: &WorkflowConfig) -> DeploymentMatrix {
    let mut matrix = DeploymentMatrix::default();
    for label in labels {
        if !label.is_valid() {
            continue;
        }
        if let Some(item) = resolve(label, config) {
            matrix.items.push(item);
        }
    }
    matrix
}

fn resolve(label: &DeployLabel, config: &WorkflowConfig) -> Option<DeploymentMatrixItem> {
    let stack = label.stack_or_default();
    let environment = config.resolved_environment(&label.environment)?;
    let template = config.directory_convention_for(&label.service, stack)?;
    let working_directory = expand_template(template, &label.service, &label.environment);

    // Terragrunt lanes cannot run without credentials to assume.
    let (iam_role_plan, iam_role_apply) = match stack {
        Stack::Terragrunt => (
            Some(environment.iam_role_plan?),
            Some(environment.iam_role_apply?),
        ),
        Stack::Kubernetes => (None, None),
    };

    let versions = config.tool_versions();
    Some(DeploymentMatrixItem {
        service: label.service.clone(),
        environment: label.environment.clone(),
        stack,
        aws_region: environment.aws_region,
        working_directory,
        iam_role_plan,
        iam_role_apply,
        terraform_version: versions.terraform,
        terragrunt_version: versions.terragrunt,
    })
}
