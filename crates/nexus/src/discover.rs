//! Source discovery: walk collection roots, filter PDFs, and hash content.
//!
//! For each configured root:
//!
//! 1. The root is checked against the mount guard ([`check_root`]). A
//!    rejected root is logged and skipped.
//! 2. The tree is walked recursively, following symlinks unless
//!    `follow_symlinks` is off. Unreadable entries, broken links and link
//!    loops are logged and skipped.
//! 3. Only files with a `.pdf` extension (any case) are considered.
//! 4. Exclude globs are applied first against the full path, then include
//!    globs (an empty include list matches everything).
//! 5. Files above the size ceiling, or whose metadata cannot be read, are
//!    skipped.
//! 6. Surviving files are hashed with SHA-256 in 8 KiB blocks.
//!
//! Results are sorted by path for stable logs. Discovery never writes.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use nexus_core::models::DiscoveredFile;

use crate::config::{CollectionConfig, DiscoveryConfig};

const HASH_BLOCK_SIZE: usize = 8192;

/// Find every PDF belonging to a collection.
pub fn discover(
    collection: &CollectionConfig,
    settings: &DiscoveryConfig,
) -> Result<Vec<DiscoveredFile>> {
    let include_set = build_globset(&collection.include)?;
    let exclude_set = build_globset(&collection.exclude)?;
    let max_size = settings.max_file_size_bytes();

    let mut files = Vec::new();

    for configured_root in &collection.roots {
        let root = match check_root(configured_root, settings) {
            Ok(root) => root,
            Err(e) => {
                tracing::warn!(root = %configured_root.display(), "skipping root: {:#}", e);
                continue;
            }
        };

        for entry in WalkDir::new(&root).follow_links(settings.follow_symlinks) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_pdf(entry.path()) {
                continue;
            }

            let path = entry.path();
            if exclude_set.is_match(path) {
                continue;
            }
            if !collection.include.is_empty() && !include_set.is_match(path) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "stat failed: {}", e);
                    continue;
                }
            };
            if metadata.len() > max_size {
                tracing::info!(
                    path = %path.display(),
                    size = metadata.len(),
                    "skipping file above max_file_size_mb"
                );
                continue;
            }

            let sha256 = match hash_file(path) {
                Ok(h) => h,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "hash failed: {:#}", e);
                    continue;
                }
            };

            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            files.push(DiscoveredFile {
                path: path.to_path_buf(),
                root: root.clone(),
                relative_path: path.strip_prefix(&root).unwrap_or(path).to_path_buf(),
                sha256,
                mtime,
                size: metadata.len(),
            });
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);
    Ok(files)
}

/// Validate a configured root against the mount guard.
///
/// Rejects roots containing `..`, roots that do not exist, roots under a
/// blocked prefix, and (when `allowed_roots` is non-empty) roots outside
/// every allowed prefix. Returns the canonical path on success.
pub fn check_root(root: &Path, settings: &DiscoveryConfig) -> Result<PathBuf> {
    if root.components().any(|c| matches!(c, Component::ParentDir)) {
        bail!("root contains '..'");
    }
    if !root.exists() {
        bail!("root does not exist");
    }
    let canonical = root
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", root.display()))?;

    for blocked in &settings.blocked_roots {
        if canonical.starts_with(blocked) || canonical.starts_with(resolve(blocked)) {
            bail!("root is under blocked path {}", blocked.display());
        }
    }

    if !settings.allowed_roots.is_empty()
        && !settings
            .allowed_roots
            .iter()
            .any(|allowed| canonical.starts_with(allowed) || canonical.starts_with(resolve(allowed)))
    {
        bail!("root is outside allowed_roots");
    }

    Ok(canonical)
}

fn resolve(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Hex SHA-256 of a file, read in fixed-size blocks.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_BLOCK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
