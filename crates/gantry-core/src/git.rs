//! Local repository probes backed by libgit2.

use std::path::Path;

use anyhow::Context;
use git2::{Repository, StatusOptions};

/// Fallback commit identifier when HEAD cannot be resolved. Callers must
/// tolerate this placeholder rather than treating it as a real commit.
pub const UNKNOWN_COMMIT: &str = "unknown";

pub struct GitClient {
    repo: Repository,
}

impl GitClient {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let repo = Repository::discover(path)
            .with_context(|| format!("Not a git repository: {}", path.display()))?;
        Ok(Self { repo })
    }

    /// Files changed between two refs, falling back to working-tree
    /// changes when either ref does not exist.
    pub fn changed_files(
        &self,
        base: Option<&str>,
        head: Option<&str>,
    ) -> anyhow::Result<Vec<String>> {
        match (base, head) {
            (Some(base), Some(head)) => match self.diff_refs(base, head) {
                Ok(files) => Ok(files),
                Err(err) => {
                    tracing::warn!("ref diff failed ({err:#}), using working tree changes");
                    self.working_tree_changes()
                }
            },
            (Some(base), None) => match self.diff_ref_to_workdir(base) {
                Ok(files) => Ok(files),
                Err(err) => {
                    tracing::warn!("ref diff failed ({err:#}), using working tree changes");
                    self.working_tree_changes()
                }
            },
            _ => self.working_tree_changes(),
        }
    }

    // Three-dot semantics: changes on head since the common ancestor.
    fn diff_refs(&self, base: &str, head: &str) -> anyhow::Result<Vec<String>> {
        let base_commit = self.repo.revparse_single(base)?.peel_to_commit()?;
        let head_commit = self.repo.revparse_single(head)?.peel_to_commit()?;
        let merge_base = self.repo.merge_base(base_commit.id(), head_commit.id())?;
        let base_tree = self.repo.find_commit(merge_base)?.tree()?;
        let head_tree = head_commit.tree()?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&base_tree), Some(&head_tree), None)?;
        Ok(collect_paths(&diff))
    }

    fn diff_ref_to_workdir(&self, base: &str) -> anyhow::Result<Vec<String>> {
        let tree = self.repo.revparse_single(base)?.peel_to_commit()?.tree()?;
        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(Some(&tree), None)?;
        Ok(collect_paths(&diff))
    }

    // Staged plus unstaged changes against HEAD.
    fn working_tree_changes(&self) -> anyhow::Result<Vec<String>> {
        let head_tree = self.repo.head().ok().and_then(|h| h.peel_to_tree().ok());
        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(head_tree.as_ref(), None)?;
        Ok(collect_paths(&diff))
    }

    /// HEAD commit id, or the literal "unknown" sentinel when the
    /// repository has no resolvable HEAD.
    pub fn head_sha(&self) -> String {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .map(|commit| commit.id().to_string())
            .unwrap_or_else(|| UNKNOWN_COMMIT.to_string())
    }

    pub fn current_branch(&self) -> anyhow::Result<String> {
        let head = self.repo.head().context("Failed to resolve HEAD")?;
        Ok(head.shorthand().unwrap_or("HEAD").to_string())
    }

    /// Working tree has no staged, unstaged, or untracked changes.
    pub fn is_clean(&self) -> anyhow::Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .context("Failed to check repository status")?;
        Ok(statuses.is_empty())
    }
}

fn collect_paths(diff: &git2::Diff<'_>) -> Vec<String> {
    let mut files = Vec::new();
    for delta in diff.deltas() {
        if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
            let path = path.to_string_lossy().to_string();
            if !files.contains(&path) {
                files.push(path);
            }
        }
    }
    files
}
