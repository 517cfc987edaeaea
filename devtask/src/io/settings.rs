//! Project settings stored in `devtask.toml` at the project root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// File name looked up in the project root.
pub const SETTINGS_FILE: &str = "devtask.toml";

/// Project settings (TOML).
///
/// Every field has a default matching the conventional scaffold layout, so
/// the file is optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub build: BuildSettings,
    pub start: StartSettings,
    pub test: TestSettings,
}

/// Project layout, relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathSettings {
    /// HTML entry document.
    pub html_entry: PathBuf,
    /// JavaScript entry module.
    pub js_entry: PathBuf,
    /// Static assets copied verbatim into the build.
    pub public_dir: PathBuf,
    /// Build output directory.
    pub build_dir: PathBuf,
    /// Source tree watched by the dev server.
    pub src_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            html_entry: PathBuf::from("public/index.html"),
            js_entry: PathBuf::from("src/index.js"),
            public_dir: PathBuf::from("public"),
            build_dir: PathBuf::from("build"),
            src_dir: PathBuf::from("src"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildSettings {
    /// Bundler invocation; must print a JSON stats document on stdout.
    pub command: Vec<String>,
    /// Wall-clock limit for one bundler run.
    pub timeout_secs: u64,
    /// Truncate captured bundler stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            command: vec![
                "npx".to_string(),
                "webpack".to_string(),
                "--mode=production".to_string(),
                "--json".to_string(),
            ],
            timeout_secs: 10 * 60,
            output_limit_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StartSettings {
    /// Optional compiler kept running in watch mode next to the dev server.
    pub command: Option<Vec<String>>,
    /// Public path substituted for `%PUBLIC_URL%` in the served HTML.
    pub public_path: String,
}

impl Default for StartSettings {
    fn default() -> Self {
        Self {
            command: None,
            public_path: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestSettings {
    /// Test runner invocation; CLI pass-through args are appended.
    pub command: Vec<String>,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            command: vec!["npx".to_string(), "jest".to_string()],
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if !is_usable_command(&self.build.command) {
            return Err(anyhow!("build.command must be a non-empty array"));
        }
        if let Some(cmd) = &self.start.command
            && !is_usable_command(cmd)
        {
            return Err(anyhow!("start.command must be a non-empty array when set"));
        }
        if !is_usable_command(&self.test.command) {
            return Err(anyhow!("test.command must be a non-empty array"));
        }
        if self.build.timeout_secs == 0 {
            return Err(anyhow!("build.timeout_secs must be > 0"));
        }
        if self.build.output_limit_bytes == 0 {
            return Err(anyhow!("build.output_limit_bytes must be > 0"));
        }
        if !self.start.public_path.starts_with('/') {
            return Err(anyhow!("start.public_path must start with '/'"));
        }
        Ok(())
    }
}

fn is_usable_command(command: &[String]) -> bool {
    command.first().is_some_and(|program| !program.trim().is_empty())
}

/// Load settings from `root/devtask.toml`.
///
/// If the file is missing, returns `Settings::default()`.
pub fn load_settings(root: &Path) -> Result<Settings> {
    let path = root.join(SETTINGS_FILE);
    if !path.exists() {
        let settings = Settings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let settings: Settings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings
        .validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(settings)
}

/// Write settings to `root/devtask.toml` (temp file + rename).
pub fn write_settings(root: &Path, settings: &Settings) -> Result<()> {
    settings.validate()?;
    let mut buf = toml::to_string_pretty(settings).context("serialize settings toml")?;
    buf.push('\n');
    let path = root.join(SETTINGS_FILE);
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(temp.path()).expect("load");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut settings = Settings::default();
        settings.start.command = Some(vec!["npx".to_string(), "esbuild".to_string()]);
        write_settings(temp.path(), &settings).expect("write");
        let loaded = load_settings(temp.path()).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join(SETTINGS_FILE),
            "[paths]\njs_entry = \"src/main.tsx\"\n",
        )
        .expect("write");
        let loaded = load_settings(temp.path()).expect("load");
        assert_eq!(loaded.paths.js_entry, PathBuf::from("src/main.tsx"));
        assert_eq!(loaded.paths.html_entry, PathBuf::from("public/index.html"));
        assert_eq!(loaded.test, TestSettings::default());
    }

    #[test]
    fn empty_build_command_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join(SETTINGS_FILE), "[build]\ncommand = []\n").expect("write");
        let err = load_settings(temp.path()).expect_err("should fail");
        assert!(format!("{err:#}").contains("build.command"));
    }
}
