//! Deploy label value type and stack lanes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire prefix for deploy labels on pull requests.
pub const LABEL_PREFIX: &str = "deploy:";

/// Infrastructure lane a label deploys through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stack {
    Terragrunt,
    Kubernetes,
}

impl Stack {
    pub fn as_str(self) -> &'static str {
        match self {
            Stack::Terragrunt => "terragrunt",
            Stack::Kubernetes => "kubernetes",
        }
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (service, environment, stack) triple expressing deployment intent.
///
/// Labels are equal and deduplicate by the full tuple. The wire form on a
/// pull request is `deploy:<service>`; the environment comes from branch
/// context, not from the label string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeployLabel {
    pub service: String,
    pub environment: String,
    pub stack: Option<Stack>,
}

impl DeployLabel {
    pub fn new(service: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            environment: environment.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: Stack) -> Self {
        self.stack = Some(stack);
        self
    }

    /// Parse a `deploy:<service>` label string, attaching the environment
    /// supplied by the caller's branch context.
    pub fn parse(label: &str, environment: &str) -> Option<Self> {
        let service = label.strip_prefix(LABEL_PREFIX)?.trim();
        if service.is_empty() {
            return None;
        }
        Some(Self::new(service, environment))
    }

    /// A label is deployable only with a non-empty service and environment.
    pub fn is_valid(&self) -> bool {
        !self.service.is_empty() && !self.environment.is_empty()
    }

    /// Stack lane, defaulting to terragrunt for branch-derived labels that
    /// carry none.
    pub fn stack_or_default(&self) -> Stack {
        self.stack.unwrap_or(Stack::Terragrunt)
    }

    /// Wire form for pull request labels.
    pub fn label_string(&self) -> String {
        format!("{LABEL_PREFIX}{}", self.service)
    }
}

impl fmt::Display for DeployLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{LABEL_PREFIX}{}", self.service)
    }
}
