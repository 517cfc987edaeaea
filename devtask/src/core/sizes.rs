//! Build asset size bookkeeping: hash-insensitive naming, deltas and limits.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Gzipped main bundle size above which splitting is suggested.
pub const WARN_AFTER_BUNDLE_GZIP_SIZE: u64 = 512 * 1024;
/// Gzipped chunk size above which splitting is suggested.
pub const WARN_AFTER_CHUNK_GZIP_SIZE: u64 = 1024 * 1024;
/// Growth against the previous build above which a row is marked.
pub const LARGE_GROWTH: u64 = 50 * 1024;

static HASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/?(.*?)(\.[0-9a-f]+)(\.chunk)?(\.js|\.css)$").unwrap()
});

/// Gzip sizes keyed by hash-stripped relative asset name.
pub type SizeMap = BTreeMap<String, u64>;

/// One row of the post-build size report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReport {
    /// Path relative to the build directory, as emitted.
    pub name: String,
    pub gzip_size: u64,
    /// Signed change against the previous build, if the asset existed then.
    pub delta: Option<i64>,
    /// Exceeds the recommended gzip size for its kind.
    pub oversized: bool,
    /// Grew by more than [`LARGE_GROWTH`] since the previous build.
    pub large_growth: bool,
}

/// Drop the content hash so `main.1a2b3c.js` and `main.4d5e6f.js` compare equal.
pub fn strip_hash(name: &str) -> String {
    let normalized = name.replace('\\', "/");
    match HASH_RE.captures(&normalized) {
        Some(caps) => format!("{}{}", &caps[1], &caps[4]),
        None => normalized.trim_start_matches('/').to_string(),
    }
}

fn is_main_bundle(name: &str) -> bool {
    let file = name.rsplit('/').next().unwrap_or(name);
    file.starts_with("main.")
}

/// Build report rows, largest first.
pub fn report(assets: &[(String, u64)], previous: &SizeMap) -> Vec<AssetReport> {
    let mut rows: Vec<AssetReport> = assets
        .iter()
        .map(|(name, size)| {
            let limit = if is_main_bundle(name) {
                WARN_AFTER_BUNDLE_GZIP_SIZE
            } else {
                WARN_AFTER_CHUNK_GZIP_SIZE
            };
            let delta = previous
                .get(&strip_hash(name))
                .map(|before| *size as i64 - *before as i64);
            AssetReport {
                name: name.clone(),
                gzip_size: *size,
                delta,
                oversized: *size > limit,
                large_growth: delta.is_some_and(|d| d > LARGE_GROWTH as i64),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.gzip_size.cmp(&a.gzip_size).then(a.name.cmp(&b.name)));
    rows
}

/// Human-readable size, e.g. `1.5 kB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "kB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

/// Delta label shown next to a size; empty when unchanged or unknown.
pub fn format_delta(delta: Option<i64>) -> String {
    match delta {
        Some(d) if d > 0 => format!("(+{})", format_size(d.unsigned_abs())),
        Some(d) if d < 0 => format!("(-{})", format_size(d.unsigned_abs())),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_hash_removes_content_hash() {
        assert_eq!(strip_hash("static/js/main.1a2b3c4d.js"), "static/js/main.js");
        assert_eq!(
            strip_hash("static/js/787.9f8e7d6c.chunk.js"),
            "static/js/787.js"
        );
        assert_eq!(strip_hash("/static/css/main.abc123.css"), "static/css/main.css");
        assert_eq!(strip_hash("robots.txt"), "robots.txt");
    }

    #[test]
    fn report_computes_delta_against_previous_build() {
        let mut previous = SizeMap::new();
        previous.insert("static/js/main.js".to_string(), 1000);
        let rows = report(
            &[
                ("static/js/main.aaaa.js".to_string(), 1500),
                ("static/css/main.bbbb.css".to_string(), 200),
            ],
            &previous,
        );
        assert_eq!(rows[0].name, "static/js/main.aaaa.js");
        assert_eq!(rows[0].delta, Some(500));
        assert_eq!(rows[1].delta, None);
        assert!(!rows[0].large_growth);
    }

    #[test]
    fn growth_beyond_threshold_is_marked() {
        let mut previous = SizeMap::new();
        previous.insert("static/js/main.js".to_string(), 10_000);
        previous.insert("static/js/7.js".to_string(), 10_000);
        let rows = report(
            &[
                ("static/js/main.aaaa.js".to_string(), 10_000 + LARGE_GROWTH + 1),
                ("static/js/7.bbbb.chunk.js".to_string(), 10_000 + LARGE_GROWTH),
            ],
            &previous,
        );
        assert!(rows[0].large_growth);
        assert!(!rows[1].large_growth);
        assert!(rows.iter().all(|r| !r.oversized));
    }

    #[test]
    fn main_bundle_has_tighter_limit_than_chunks() {
        let size = WARN_AFTER_BUNDLE_GZIP_SIZE + 1;
        let rows = report(
            &[
                ("static/js/main.aaaa.js".to_string(), size),
                ("static/js/12.bbbb.chunk.js".to_string(), size),
            ],
            &SizeMap::new(),
        );
        let main = rows.iter().find(|r| r.name.contains("main")).unwrap();
        let chunk = rows.iter().find(|r| r.name.contains("chunk")).unwrap();
        assert!(main.oversized);
        assert!(!chunk.oversized);
    }

    #[test]
    fn sizes_and_deltas_format() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.50 kB");
        assert_eq!(format_delta(Some(2048)), "(+2.00 kB)");
        assert_eq!(format_delta(Some(-10)), "(-10 B)");
        assert_eq!(format_delta(Some(0)), "");
        assert_eq!(format_delta(None), "");
    }
}
