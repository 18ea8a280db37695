//! Key/value output sink for downstream CI steps.
//!
//! Pipeline results are handed to later workflow steps through an injected
//! sink instead of process-global environment state, so runs can execute
//! in parallel test processes without observing each other.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;

pub trait OutputSink {
    fn emit(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Appends `KEY=value` lines to the file GitHub Actions exposes through
/// `$GITHUB_ENV`.
#[derive(Debug, Clone)]
pub struct GithubActionsSink {
    path: PathBuf,
}

impl GithubActionsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OutputSink for GithubActionsSink {
    fn emit(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open output file {}", self.path.display()))?;
        writeln!(file, "{key}={value}")
            .with_context(|| format!("Failed to write output to {}", self.path.display()))?;
        Ok(())
    }
}

/// Prints `KEY=value` lines, for local runs outside a workflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        println!("{key}={value}");
        Ok(())
    }
}

/// Captures emitted pairs in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub entries: Vec<(String, String)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl OutputSink for MemorySink {
    fn emit(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.push((key.to_string(), value.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_actions_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("github_env");

        let mut sink = GithubActionsSink::new(&path);
        sink.emit("TARGET_ENVIRONMENT", "staging").unwrap();
        sink.emit("HAS_TARGETS", "true").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "TARGET_ENVIRONMENT=staging\nHAS_TARGETS=true\n");
    }

    #[test]
    fn memory_sink_records_pairs_in_order() {
        let mut sink = MemorySink::new();
        sink.emit("A", "1").unwrap();
        sink.emit("B", "2").unwrap();

        assert_eq!(sink.get("A"), Some("1"));
        assert_eq!(sink.get("B"), Some("2"));
        assert_eq!(sink.get("C"), None);
        assert_eq!(sink.entries.len(), 2);
    }
}
