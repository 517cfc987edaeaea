//! Resolved project paths and the required-files pre-flight check.

use std::path::{Path, PathBuf};

use crate::core::error::TaskError;
use crate::io::settings::PathSettings;

/// Absolute-ish project paths, resolved against the project root once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub html_entry: PathBuf,
    pub js_entry: PathBuf,
    pub public_dir: PathBuf,
    pub build_dir: PathBuf,
    pub src_dir: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: &Path, settings: &PathSettings) -> Self {
        Self {
            root: root.to_path_buf(),
            html_entry: root.join(&settings.html_entry),
            js_entry: root.join(&settings.js_entry),
            public_dir: root.join(&settings.public_dir),
            build_dir: root.join(&settings.build_dir),
            src_dir: root.join(&settings.src_dir),
        }
    }

    /// Entry files a build or dev server cannot do without.
    pub fn entries(&self) -> [&Path; 2] {
        [&self.html_entry, &self.js_entry]
    }

    /// Where `build --stats` writes the bundler stats.
    pub fn stats_path(&self) -> PathBuf {
        self.build_dir.join("bundle-stats.json")
    }
}

/// Fail with every missing file listed, or succeed if all are regular files.
pub fn check_required_files(files: &[&Path]) -> Result<(), TaskError> {
    let missing: Vec<PathBuf> = files
        .iter()
        .filter(|path| !path.is_file())
        .map(|path| path.to_path_buf())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TaskError::MissingRequiredFiles(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn resolves_against_root() {
        let paths = ProjectPaths::new(Path::new("/app"), &PathSettings::default());
        assert_eq!(paths.html_entry, PathBuf::from("/app/public/index.html"));
        assert_eq!(paths.stats_path(), PathBuf::from("/app/build/bundle-stats.json"));
    }

    #[test]
    fn reports_all_missing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path(), &PathSettings::default());
        let err = check_required_files(&paths.entries()).expect_err("missing");
        assert_eq!(
            err,
            TaskError::MissingRequiredFiles(vec![paths.html_entry.clone(), paths.js_entry.clone()])
        );
    }

    #[test]
    fn directory_does_not_satisfy_a_file_requirement() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path(), &PathSettings::default());
        fs::create_dir_all(&paths.html_entry).expect("mkdir");
        fs::create_dir_all(paths.js_entry.parent().unwrap()).expect("mkdir src");
        fs::write(&paths.js_entry, "").expect("write js");
        let err = check_required_files(&paths.entries()).expect_err("html is a dir");
        assert_eq!(err, TaskError::MissingRequiredFiles(vec![paths.html_entry]));
    }
}
