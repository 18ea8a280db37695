//! Gantry Core Library
//!
//! Domain logic for the label-driven deployment pipeline: resolving branch
//! pushes and merged pull requests into validated deployment matrices, and
//! propagating built Kubernetes manifests into a GitOps repository.

pub mod branch;
pub mod config;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod git;
pub mod label;
pub mod manifest;
pub mod matrix;
pub mod output;
pub mod pipeline;
pub mod reconcile;
pub mod safety;
pub mod vcs;

/// Re-exports of commonly used types
pub mod prelude {
    // Labels
    pub use crate::label::{DeployLabel, Stack};

    // Configuration
    pub use crate::config::{
        ConfigGateway, DirectoryConventions, EnvironmentConfig, SafetyChecks, ServiceConfig,
        WorkflowConfig, YamlConfigFile,
    };

    // Pipeline
    pub use crate::pipeline::{
        DeployTrigger, DispatchReport, LabelDispatcher, MatrixScope, TriggerOptions, TriggerReport,
    };

    // Matrix
    pub use crate::matrix::{DeploymentMatrix, DeploymentMatrixItem};

    // Manifest propagation
    pub use crate::manifest::{
        DeploymentInfo, DryRunReport, KubernetesTarget, ManifestUpdateOrchestrator,
        ManifestUpdateOutcome, ManifestUpdateReport, UpdateFromPrRequest,
    };

    // Gateways
    pub use crate::output::OutputSink;
    pub use crate::vcs::{GithubClient, PullRequest, VcsGateway};

    // Errors
    pub use crate::error::PipelineError;
}
