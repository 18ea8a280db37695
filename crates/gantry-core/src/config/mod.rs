//! Workflow configuration loading.

pub mod schema;

pub use schema::{
    BranchPattern, DirectoryConventions, EnvironmentConfig, EnvironmentDefaults, ExclusionConfig,
    ResolvedEnvironment, SafetyChecks, ServiceConfig, ToolVersions, WorkflowConfig,
    expand_template,
};

use std::path::{Path, PathBuf};

use anyhow::Context;

/// Default location of the workflow configuration file.
pub const DEFAULT_CONFIG_PATH: &str = ".github/workflow-config.yaml";

/// Where the pipeline reads its workflow configuration from.
///
/// The config is the only long-lived input of a run; it is loaded once and
/// treated as immutable afterwards.
pub trait ConfigGateway {
    fn load_workflow_config(&self) -> anyhow::Result<WorkflowConfig>;
}

/// YAML-backed configuration file.
#[derive(Debug, Clone)]
pub struct YamlConfigFile {
    path: PathBuf,
}

impl YamlConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigGateway for YamlConfigFile {
    fn load_workflow_config(&self) -> anyhow::Result<WorkflowConfig> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Configuration file not found: {}", self.path.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse configuration from {}", self.path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", self.path.display()))?;
        Ok(config)
    }
}
