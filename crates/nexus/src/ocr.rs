//! OCR fallback via an external `ocrmypdf`-compatible program.
//!
//! Output lands at `<processed_dir>/<collection>/<path relative to root>`,
//! or `<processed_dir>/<collection>/<file name>` when the source is not
//! under its root. Each attempt runs under a hard wall-clock timeout.
//!
//! Transient failures are retried with exponential backoff
//! (`initial * 2^(attempt - 1)`, capped). Timeouts, bad input, bad
//! arguments, and a missing program fail immediately.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::OcrConfig;

/// ocrmypdf exit codes that retrying cannot fix: bad arguments, bad input
/// file, missing dependency, encrypted input, invalid configuration.
const NON_TRANSIENT_EXIT_CODES: &[i32] = &[1, 2, 3, 8, 9];

const MAX_STDERR_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("OCR exited with status {}: {stderr}", describe_status(.code))]
    Failed { code: Option<i32>, stderr: String },

    #[error("failed to launch OCR program '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("OCR I/O error: {0}")]
    Io(#[from] io::Error),
}

impl OcrError {
    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            OcrError::Timeout(_) => false,
            OcrError::Failed { code: Some(code), .. } => !NON_TRANSIENT_EXIT_CODES.contains(code),
            OcrError::Failed { code: None, .. } => true,
            OcrError::Spawn { source, .. } => source.kind() != io::ErrorKind::NotFound,
            OcrError::Io(_) => false,
        }
    }
}

fn describe_status(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

/// Produces a text-layered copy of a PDF.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// OCR `source` and return the path of the output file.
    async fn run(&self, source: &Path, collection: &str, root: &Path) -> Result<PathBuf, OcrError>;
}

/// Runtime settings for [`OcrMyPdf`].
#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub program: String,
    pub processed_dir: PathBuf,
    pub jobs: u32,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl From<&OcrConfig> for OcrSettings {
    fn from(config: &OcrConfig) -> Self {
        Self {
            program: config.program.clone(),
            processed_dir: config.processed_dir.clone(),
            jobs: config.jobs,
            timeout: config.timeout(),
            max_attempts: config.max_attempts,
            backoff_initial: config.backoff_initial(),
            backoff_max: config.backoff_max(),
        }
    }
}

impl OcrSettings {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff_initial
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

/// Where OCR output for `source` is written.
pub fn output_path(processed_dir: &Path, collection: &str, source: &Path, root: &Path) -> PathBuf {
    let relative = match source.strip_prefix(root) {
        Ok(rel) if source.is_absolute() && !rel.as_os_str().is_empty() => rel.to_path_buf(),
        _ => PathBuf::from(source.file_name().unwrap_or(source.as_os_str())),
    };
    processed_dir.join(collection).join(relative)
}

/// Runs `ocrmypdf --skip-text --rotate-pages --deskew -j <jobs> <src> <dest>`.
pub struct OcrMyPdf {
    settings: OcrSettings,
}

impl OcrMyPdf {
    pub fn new(settings: OcrSettings) -> Self {
        Self { settings }
    }

    async fn run_once(&self, source: &Path, dest: &Path) -> Result<(), OcrError> {
        let child = Command::new(&self.settings.program)
            .arg("--skip-text")
            .arg("--rotate-pages")
            .arg("--deskew")
            .arg("-j")
            .arg(self.settings.jobs.to_string())
            .arg(source)
            .arg(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| OcrError::Spawn {
                program: self.settings.program.clone(),
                source,
            })?;

        // On timeout the dropped future drops the child, which kills it.
        let output = tokio::time::timeout(self.settings.timeout, child.wait_with_output())
            .await
            .map_err(|_| OcrError::Timeout(self.settings.timeout))??;

        if output.status.success() {
            return Ok(());
        }

        let stderr: String = String::from_utf8_lossy(&output.stderr)
            .trim()
            .chars()
            .take(MAX_STDERR_CHARS)
            .collect();
        Err(OcrError::Failed {
            code: output.status.code(),
            stderr,
        })
    }
}

#[async_trait]
impl OcrEngine for OcrMyPdf {
    async fn run(&self, source: &Path, collection: &str, root: &Path) -> Result<PathBuf, OcrError> {
        let dest = output_path(&self.settings.processed_dir, collection, source, root);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.run_once(source, &dest).await {
                Ok(()) => return Ok(dest),
                Err(e) if !e.is_transient() || attempt >= max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.settings.backoff(attempt);
                    tracing::warn!(
                        path = %source.display(),
                        attempt,
                        max_attempts,
                        "OCR failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> OcrSettings {
        OcrSettings::from(&OcrConfig::default())
    }

    #[test]
    fn test_output_path_mirrors_relative_path() {
        let dest = output_path(
            Path::new("/data/processed"),
            "library",
            Path::new("/corpora/lib/a/b/scan.pdf"),
            Path::new("/corpora/lib"),
        );
        assert_eq!(dest, PathBuf::from("/data/processed/library/a/b/scan.pdf"));
    }

    #[test]
    fn test_output_path_falls_back_to_file_name() {
        let dest = output_path(
            Path::new("/data/processed"),
            "library",
            Path::new("/elsewhere/scan.pdf"),
            Path::new("/corpora/lib"),
        );
        assert_eq!(dest, PathBuf::from("/data/processed/library/scan.pdf"));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let s = settings();
        assert_eq!(s.backoff(1), Duration::from_secs(2));
        assert_eq!(s.backoff(2), Duration::from_secs(4));
        assert_eq!(s.backoff(3), Duration::from_secs(8));
        assert_eq!(s.backoff(10), Duration::from_secs(60));
    }

    #[test]
    fn test_transient_classification() {
        let failed = |code| OcrError::Failed {
            code: Some(code),
            stderr: String::new(),
        };
        assert!(!OcrError::Timeout(Duration::from_secs(1)).is_transient());
        for code in [1, 2, 3, 8, 9] {
            assert!(!failed(code).is_transient(), "exit {} retried", code);
        }
        assert!(failed(5).is_transient());
        assert!(failed(15).is_transient());
        let missing = OcrError::Spawn {
            program: "nope".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(!missing.is_transient());
    }
}
