//! Gantry - label-driven deployment pipeline
//!
//! Usage:
//!   gantry trigger --branch staging/orders   # branch push -> matrix
//!   gantry trigger --pr 42                   # PR labels -> matrix
//!   gantry dispatch --pr 42                  # converge PR deploy labels
//!   gantry manifest update --pr 42 ...       # GitOps manifest PRs
//!   gantry config validate

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gantry_core::config::{ConfigGateway, DEFAULT_CONFIG_PATH, WorkflowConfig, YamlConfigFile};
use gantry_core::git::GitClient;
use gantry_core::manifest::{ManifestUpdateOrchestrator, UpdateFromPrRequest};
use gantry_core::output::{GithubActionsSink, OutputSink, StdoutSink};
use gantry_core::pipeline::{DeployTrigger, LabelDispatcher, MatrixScope, TriggerOptions};
use gantry_core::vcs::GithubClient;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "Label-driven deployment pipeline", long_about = None)]
struct Cli {
    /// Path to the workflow configuration file
    #[arg(long, global = true, env = "GANTRY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a deployment matrix from a branch push or a merged PR
    Trigger(TriggerArgs),

    /// Converge a PR's deploy labels with its changed files
    Dispatch {
        /// Pull request number
        #[arg(long)]
        pr: u64,
    },

    /// GitOps manifest operations
    Manifest(ManifestArgs),

    /// Configuration maintenance
    Config(ConfigArgs),
}

#[derive(Args)]
struct TriggerArgs {
    /// Branch that was pushed
    #[arg(long, conflicts_with = "pr", required_unless_present = "pr")]
    branch: Option<String>,

    /// Pull request to read labels from instead of a branch
    #[arg(long)]
    pr: Option<u64>,

    /// Commit that triggered the run (defaults to local HEAD)
    #[arg(long)]
    commit: Option<String>,

    /// Pipeline entry count for this commit, supplied by the scheduler
    #[arg(long, default_value_t = 1)]
    attempt: u32,

    /// Feed all fetched labels into the matrix instead of the
    /// environment-filtered set
    #[arg(long)]
    all_labels: bool,
}

#[derive(Args)]
struct ManifestArgs {
    #[command(subcommand)]
    command: ManifestSubcommand,
}

#[derive(Subcommand)]
enum ManifestSubcommand {
    /// Propagate a built manifest into the manifests repository
    Update {
        /// Merged pull request carrying the deploy labels
        #[arg(long)]
        pr: u64,

        /// Locally built manifest file to propagate
        #[arg(long)]
        manifest_file: PathBuf,

        /// Manifests repository ("owner/repo")
        #[arg(long)]
        target_repo: String,

        /// Base branch in the manifests repository
        #[arg(long)]
        target_branch: String,

        /// Restrict the update to one service (requires --environment)
        #[arg(long, requires = "environment")]
        service: Option<String>,

        /// Restrict the update to one environment (requires --service)
        #[arg(long, requires = "service")]
        environment: Option<String>,

        /// Report what would happen without writing anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Validate the workflow configuration file
    Validate,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    match cli.command {
        Commands::Trigger(args) => run_trigger(&config_path, args),
        Commands::Dispatch { pr } => run_dispatch(&config_path, pr),
        Commands::Manifest(args) => match args.command {
            ManifestSubcommand::Update {
                pr,
                manifest_file,
                target_repo,
                target_branch,
                service,
                environment,
                dry_run,
            } => run_manifest_update(
                &config_path,
                UpdateFromPrRequest {
                    pr_number: pr,
                    manifest_file,
                    target_repo,
                    target_branch,
                    service,
                    environment,
                    source_repo: source_repository(),
                },
                dry_run,
            ),
        },
        Commands::Config(args) => match args.command {
            ConfigSubcommand::Validate => run_config_validate(&config_path),
        },
    }
}

fn run_trigger(config_path: &Path, args: TriggerArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let vcs = github_client()?;
    let git = GitClient::open(Path::new(".")).ok();

    let mut trigger = DeployTrigger::new(&config, &vcs);
    if let Some(git) = git.as_ref() {
        trigger = trigger.with_git(git);
    }
    let mut sink = output_sink();

    let report = match (args.branch, args.pr) {
        (Some(branch), None) => {
            let opts = TriggerOptions {
                branch,
                commit: args.commit,
                attempt: args.attempt,
                matrix_scope: if args.all_labels {
                    MatrixScope::AllLabels
                } else {
                    MatrixScope::FilteredToEnvironment
                },
            };
            trigger.trigger_from_branch(&opts, sink.as_mut())?
        }
        (None, Some(pr)) => trigger.trigger_from_pr(pr, args.attempt, sink.as_mut())?,
        _ => anyhow::bail!("Provide exactly one of --branch or --pr"),
    };

    println!(
        "{} Deployment matrix generated",
        style("✓").green().bold()
    );
    println!("  Environment: {}", report.target_environment);
    println!("  Branch: {}", report.branch);
    if let Some(number) = report.merged_pr_number {
        println!("  Merged PR: #{number}");
    }
    for warning in &report.safety.warnings {
        println!("  {} {warning}", style("warning:").yellow());
    }
    println!("  Targets: {}", report.matrix.items.len());
    for item in &report.matrix.items {
        println!(
            "    {}:{}:{} -> {}",
            item.service, item.environment, item.stack, item.working_directory
        );
    }
    Ok(())
}

fn run_dispatch(config_path: &Path, pr: u64) -> Result<()> {
    let config = load_config(config_path)?;
    let vcs = github_client()?;
    let git = GitClient::open(Path::new(".")).ok();

    let mut dispatcher = LabelDispatcher::new(&config, &vcs);
    if let Some(git) = git.as_ref() {
        dispatcher = dispatcher.with_git(git);
    }
    let mut sink = output_sink();

    let report = dispatcher.dispatch(pr, sink.as_mut())?;

    println!("{} Label dispatch completed", style("✓").green().bold());
    println!("  Deploy labels: {}", report.deploy_labels.join(", "));
    if !report.reconcile.labels_added.is_empty() {
        println!("  Added: {}", report.reconcile.labels_added.join(", "));
    }
    if !report.reconcile.labels_removed.is_empty() {
        println!("  Removed: {}", report.reconcile.labels_removed.join(", "));
    }
    for excluded in &report.excluded {
        println!(
            "  {} {} ({}): {}",
            style("excluded:").yellow(),
            excluded.service,
            excluded.kind,
            excluded.reason
        );
    }
    Ok(())
}

fn run_manifest_update(
    config_path: &Path,
    request: UpdateFromPrRequest,
    dry_run: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let vcs = github_client()?;
    let orchestrator = ManifestUpdateOrchestrator::new(&vcs, &config);

    if dry_run {
        let report = orchestrator.dry_run(&request)?;
        println!(
            "{} Dry run for PR #{}",
            style("✓").green().bold(),
            report.pr_number
        );
        println!("  Deploy label: {}", report.deploy_label);
        println!("  Target environment: {}", report.target_environment);
        println!("  Feature branch: {}", report.feature_branch);
        println!("  Target file: {}", report.target_file);
        println!("  Manifest file: {}", report.manifest_file.display());
        return Ok(());
    }

    let report = orchestrator.update_from_pr(&request)?;
    println!(
        "{} Processed {} target(s), changes: {}",
        style("✓").green().bold(),
        report.processed_targets,
        report.has_changes
    );
    for outcome in &report.results {
        match (&outcome.error, &outcome.pull_request_url) {
            (Some(error), _) => println!(
                "  {} {}:{} - {error}",
                style("failed:").red(),
                outcome.service,
                outcome.environment
            ),
            (None, Some(url)) => {
                println!("  {}:{} -> {url}", outcome.service, outcome.environment)
            }
            (None, None) => println!(
                "  {}:{} - no changes",
                outcome.service, outcome.environment
            ),
        }
    }
    Ok(())
}

fn run_config_validate(config_path: &Path) -> Result<()> {
    match load_config(config_path) {
        Ok(config) => {
            println!(
                "{} Configuration is valid ({} environments, {} services)",
                style("✓").green().bold(),
                config.environments.len(),
                config.services.len()
            );
            Ok(())
        }
        Err(err) => {
            println!("{} Configuration validation failed", style("✗").red().bold());
            Err(err)
        }
    }
}

fn load_config(path: &Path) -> Result<WorkflowConfig> {
    YamlConfigFile::new(path).load_workflow_config()
}

fn github_client() -> Result<GithubClient> {
    let token = std::env::var("GITHUB_TOKEN").context("GITHUB_TOKEN is not set")?;
    let repository =
        std::env::var("GITHUB_REPOSITORY").context("GITHUB_REPOSITORY is not set")?;
    GithubClient::new(token, repository)
}

fn source_repository() -> String {
    std::env::var("GITHUB_REPOSITORY").unwrap_or_else(|_| "unknown/repository".to_string())
}

fn output_sink() -> Box<dyn OutputSink> {
    match std::env::var("GITHUB_ENV") {
        Ok(path) if !path.is_empty() => Box::new(GithubActionsSink::new(path)),
        _ => Box::new(StdoutSink),
    }
}
