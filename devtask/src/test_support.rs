//! Test-only fakes and scratch projects.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::bundler::{BundleReport, BundleRequest, Bundler};
use crate::io::prompt::Prompter;
use crate::io::settings::{Settings, write_settings};
use crate::lifecycle::ServiceHandle;

/// Scratch project with the conventional layout (`public/index.html`, `src/index.js`).
pub struct TestProject {
    temp: TempDir,
}

impl TestProject {
    /// Project with both entry files present.
    pub fn new() -> Result<Self> {
        let project = Self::empty()?;
        project.write("public/index.html", "<html><body><div id=\"root\"></div></body></html>")?;
        project.write("src/index.js", "console.log('hello');\n")?;
        Ok(project)
    }

    /// Project directory with nothing in it.
    pub fn empty() -> Result<Self> {
        Ok(Self {
            temp: tempfile::tempdir().context("create temp project")?,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.temp.path().join(rel)
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn write_settings(&self, settings: &Settings) -> Result<()> {
        write_settings(self.root(), settings)
    }
}

/// Prompter that replays canned answers and records the questions asked.
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<bool>>,
    questions: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            questions: RefCell::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, question: &str, _default_yes: bool) -> Result<bool> {
        self.questions.borrow_mut().push(question.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("unexpected prompt: {question}"))
    }
}

/// Bundler that returns queued reports and records each request's command.
pub struct ScriptedBundler {
    reports: Mutex<VecDeque<BundleReport>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedBundler {
    pub fn new(reports: Vec<BundleReport>) -> Self {
        Self {
            reports: Mutex::new(reports.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Bundler for ScriptedBundler {
    fn bundle(&self, request: &BundleRequest) -> Result<BundleReport> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("calls lock poisoned"))?
            .push(request.command.clone());
        self.reports
            .lock()
            .map_err(|_| anyhow!("reports lock poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow!("unexpected bundler call"))
    }
}

/// Service that never ends on its own.
#[derive(Debug)]
pub struct PendingService;

impl ServiceHandle for PendingService {
    async fn exited(&mut self) -> Result<i32> {
        std::future::pending().await
    }
}

/// Service that ends by itself after a short delay.
#[derive(Debug)]
pub struct ScriptedService {
    code: i32,
    after: Duration,
}

impl ScriptedService {
    pub fn exiting_with(code: i32) -> Self {
        Self {
            code,
            after: Duration::from_millis(10),
        }
    }
}

impl ServiceHandle for ScriptedService {
    async fn exited(&mut self) -> Result<i32> {
        tokio::time::sleep(self.after).await;
        Ok(self.code)
    }
}
