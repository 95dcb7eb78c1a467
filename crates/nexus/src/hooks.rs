//! Optional pre/post ingestion hook scripts.
//!
//! With `[hooks] enabled = true`, a run looks in the hooks directory for:
//!
//! - `pre-ingest-<collection>.sh`: runs before the per-file loop with
//!   `NEXUS_COLLECTION` and `NEXUS_FILES` (comma-separated paths).
//! - `post-ingest-<collection>.sh`: runs after the loop with
//!   `NEXUS_PROCESSED_COUNT`, `NEXUS_SKIPPED_COUNT`, `NEXUS_FAILED_COUNT`
//!   and `NEXUS_DUPLICATE_COUNT`.
//!
//! # Output protocol
//!
//! Stdout is read line by line:
//!
//! ```text
//! SKIP: /corpora/library/draft.pdf
//! METADATA: source=scanner
//! MODIFIED_QUERY: expanded query text
//! ```
//!
//! A missing, non-executable, failing, or timed-out hook is logged and
//! yields empty output. Hooks never abort a run.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::HooksConfig;
use crate::ingest::IngestSummary;

/// Parsed hook stdout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookOutput {
    /// Paths to drop from the run.
    pub skip: Vec<String>,
    /// `key=value` pairs to attach to every document of the run.
    pub metadata: Vec<(String, String)>,
    /// Rewritten query; not used by ingestion.
    pub modified_query: Option<String>,
}

impl HookOutput {
    /// Metadata rendered as `key=value` tags.
    pub fn metadata_tags(&self) -> Vec<String> {
        self.metadata
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

/// Parse the line protocol. Unrecognised lines are ignored.
pub fn parse_hook_output(stdout: &str) -> HookOutput {
    let mut out = HookOutput::default();
    for line in stdout.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("SKIP:") {
            let path = rest.trim();
            if !path.is_empty() {
                out.skip.push(path.to_string());
            }
        } else if let Some(rest) = line.strip_prefix("METADATA:") {
            if let Some((key, value)) = rest.trim().split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    out.metadata.push((key.to_string(), value.trim().to_string()));
                }
            }
        } else if let Some(rest) = line.strip_prefix("MODIFIED_QUERY:") {
            out.modified_query = Some(rest.trim().to_string());
        }
    }
    out
}

/// Locates and runs hook scripts.
#[derive(Debug, Clone)]
pub struct HookExecutor {
    dir: PathBuf,
    timeout: Duration,
}

impl HookExecutor {
    pub fn new(dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            timeout,
        }
    }

    /// `None` when hooks are disabled.
    pub fn from_config(config: &HooksConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(&config.dir, Duration::from_secs(config.timeout_secs)))
    }

    pub async fn run_pre_ingest(&self, collection: &str, files: &[PathBuf]) -> HookOutput {
        let joined = files
            .iter()
            .map(|p| p.to_string_lossy())
            .collect::<Vec<_>>()
            .join(",");
        self.run_hook(
            &format!("pre-ingest-{}.sh", collection),
            &[
                ("NEXUS_COLLECTION", collection.to_string()),
                ("NEXUS_FILES", joined),
            ],
        )
        .await
    }

    pub async fn run_post_ingest(&self, collection: &str, summary: &IngestSummary) -> HookOutput {
        self.run_hook(
            &format!("post-ingest-{}.sh", collection),
            &[
                ("NEXUS_COLLECTION", collection.to_string()),
                ("NEXUS_PROCESSED_COUNT", summary.processed.to_string()),
                ("NEXUS_SKIPPED_COUNT", summary.skipped.to_string()),
                ("NEXUS_FAILED_COUNT", summary.failed.to_string()),
                ("NEXUS_DUPLICATE_COUNT", summary.duplicates.to_string()),
            ],
        )
        .await
    }

    async fn run_hook(&self, name: &str, env: &[(&str, String)]) -> HookOutput {
        let path = self.dir.join(name);
        if !path.exists() {
            tracing::debug!(hook = %path.display(), "hook not found");
            return HookOutput::default();
        }
        if !is_executable(&path) {
            tracing::warn!(hook = %path.display(), "hook exists but is not executable");
            return HookOutput::default();
        }

        tracing::info!(hook = %path.display(), "running hook");
        let child = match Command::new(&path)
            .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(hook = %path.display(), "hook failed to start: {}", e);
                return HookOutput::default();
            }
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Err(_) => {
                tracing::error!(hook = %path.display(), "hook timed out after {:?}", self.timeout);
                HookOutput::default()
            }
            Ok(Err(e)) => {
                tracing::error!(hook = %path.display(), "hook failed: {}", e);
                HookOutput::default()
            }
            Ok(Ok(output)) if !output.status.success() => {
                tracing::warn!(
                    hook = %path.display(),
                    status = ?output.status.code(),
                    "hook failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                HookOutput::default()
            }
            Ok(Ok(output)) => parse_hook_output(&String::from_utf8_lossy(&output.stdout)),
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_directives() {
        let out = parse_hook_output(
            "starting\nSKIP: /corpora/a.pdf\nMETADATA: source = scanner\nSKIP:/corpora/b.pdf\nMODIFIED_QUERY: expanded\n",
        );
        assert_eq!(out.skip, vec!["/corpora/a.pdf", "/corpora/b.pdf"]);
        assert_eq!(out.metadata, vec![("source".to_string(), "scanner".to_string())]);
        assert_eq!(out.metadata_tags(), vec!["source=scanner"]);
        assert_eq!(out.modified_query.as_deref(), Some("expanded"));
    }

    #[test]
    fn test_parse_ignores_malformed_metadata() {
        let out = parse_hook_output("METADATA: novalue\nMETADATA: =x\nSKIP:\n");
        assert!(out.metadata.is_empty());
        assert!(out.skip.is_empty());
    }

    #[test]
    fn test_parse_keeps_equals_in_value() {
        let out = parse_hook_output("METADATA:expr=a=b");
        assert_eq!(out.metadata, vec![("expr".to_string(), "a=b".to_string())]);
    }

    #[tokio::test]
    async fn test_missing_hook_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let hooks = HookExecutor::new(tmp.path(), Duration::from_secs(5));
        let out = hooks.run_pre_ingest("library", &[PathBuf::from("/a.pdf")]).await;
        assert_eq!(out, HookOutput::default());
    }

    #[test]
    fn test_disabled_config_has_no_executor() {
        assert!(HookExecutor::from_config(&HooksConfig::default()).is_none());
        let enabled = HooksConfig {
            enabled: true,
            ..HooksConfig::default()
        };
        assert!(HookExecutor::from_config(&enabled).is_some());
    }
}
