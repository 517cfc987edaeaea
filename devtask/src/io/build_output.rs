//! Build directory housekeeping: size snapshots, cleaning, public copy, stats.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::core::sizes::{SizeMap, strip_hash};

/// Gzipped size of `bytes`.
pub fn gzip_size(bytes: &[u8]) -> Result<u64> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).context("gzip asset")?;
    let compressed = encoder.finish().context("finish gzip")?;
    Ok(compressed.len() as u64)
}

/// Every `.js` / `.css` asset under `dir` with its gzip size, keyed by relative path.
pub fn collect_assets(dir: &Path) -> Result<Vec<(String, u64)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut assets = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_sized_asset(path) {
            continue;
        }
        let rel = path
            .strip_prefix(dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        assets.push((rel, gzip_size(&bytes)?));
    }
    Ok(assets)
}

/// Snapshot of asset sizes before a build overwrites them.
pub fn measure_file_sizes(dir: &Path) -> Result<SizeMap> {
    Ok(collect_assets(dir)?
        .into_iter()
        .map(|(name, size)| (strip_hash(&name), size))
        .collect())
}

fn is_sized_asset(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("js") | Some("css")
    )
}

/// Remove everything inside `dir` but keep (or create) the directory itself.
pub fn empty_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry.with_context(|| format!("read {}", dir.display()))?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path).with_context(|| format!("remove {}", path.display()))?;
        } else {
            fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        }
    }
    debug!(dir = %dir.display(), "emptied build directory");
    Ok(())
}

/// Copy `public_dir` into `build_dir`, skipping `exclude` (the HTML entry the
/// bundler emits itself). Symlinks are followed.
pub fn copy_public(public_dir: &Path, build_dir: &Path, exclude: &Path) -> Result<usize> {
    if !public_dir.exists() {
        return Ok(0);
    }
    let mut copied = 0;
    for entry in WalkDir::new(public_dir).follow_links(true) {
        let entry = entry.with_context(|| format!("walk {}", public_dir.display()))?;
        let path = entry.path();
        if path == exclude {
            continue;
        }
        let rel = path.strip_prefix(public_dir).unwrap_or(path);
        let target = build_dir.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).with_context(|| format!("create {}", target.display()))?;
        } else {
            fs::copy(path, &target).with_context(|| {
                format!("copy {} to {}", path.display(), target.display())
            })?;
            copied += 1;
        }
    }
    debug!(copied, "copied public folder");
    Ok(copied)
}

/// Write bundler stats as pretty JSON with trailing newline.
pub fn write_stats(path: &Path, stats: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut payload = serde_json::to_string_pretty(stats).context("serialize stats json")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
