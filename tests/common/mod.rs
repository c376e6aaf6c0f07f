#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use mvnpilot::config::Config;
use mvnpilot::error::{PilotError, Result};
use mvnpilot::git::{GitClient, StatusEntry};
use mvnpilot::github::{NewPullRequest, PullRequestApi};
use mvnpilot::remote::RemoteSpec;
use mvnpilot::tools::Tools;
use tempfile::TempDir;

/// Scripted git state plus a log of every call made.
#[derive(Debug, Default)]
pub struct GitState {
    pub calls: Vec<String>,
    pub status: Vec<StatusEntry>,
    pub staged_against_head: Vec<String>,
    pub staged: Vec<String>,
    pub branch: Option<String>,
    pub remotes: Vec<String>,
    pub push_error: Option<String>,
    pub commit_error: Option<String>,
    pub commits: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeGit(pub Arc<Mutex<GitState>>);

impl FakeGit {
    pub fn on_branch(branch: &str, remote: &str) -> Self {
        let git = FakeGit::default();
        {
            let mut state = git.0.lock().unwrap();
            state.branch = Some(branch.to_string());
            state.remotes = vec![remote.to_string()];
        }
        git
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().calls.clone()
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, GitState> {
        self.0.lock().unwrap()
    }

    fn record(&self, call: &str) -> std::sync::MutexGuard<'_, GitState> {
        let mut state = self.0.lock().unwrap();
        state.calls.push(call.to_string());
        state
    }
}

impl GitClient for FakeGit {
    fn status(&self, _repo: &Path) -> Result<Vec<StatusEntry>> {
        Ok(self.record("status").status.clone())
    }

    fn staged_against_head(&self, _repo: &Path) -> Result<Vec<String>> {
        Ok(self.record("staged_against_head").staged_against_head.clone())
    }

    fn add_all(&self, _repo: &Path) -> Result<()> {
        self.record("add_all");
        Ok(())
    }

    fn staged_files(&self, _repo: &Path) -> Result<Vec<String>> {
        Ok(self.record("staged_files").staged.clone())
    }

    fn commit(&self, _repo: &Path, message: &str) -> Result<String> {
        let mut state = self.record("commit");
        if let Some(err) = &state.commit_error {
            return Err(PilotError::Git(err.clone()));
        }
        state.commits.push(message.to_string());
        Ok(format!("{:040x}", state.commits.len()))
    }

    fn current_branch(&self, _repo: &Path) -> Result<String> {
        self.record("current_branch")
            .branch
            .clone()
            .ok_or_else(|| PilotError::Git("HEAD is detached, no current branch".to_string()))
    }

    fn push(&self, _repo: &Path, remote: &str, branch: &str) -> Result<()> {
        let state = self.record(&format!("push {remote} {branch}"));
        match &state.push_error {
            Some(err) => Err(PilotError::Git(err.clone())),
            None => Ok(()),
        }
    }

    fn remote_urls(&self, _repo: &Path) -> Result<Vec<String>> {
        Ok(self.record("remote_urls").remotes.clone())
    }
}

/// Records submitted pull requests and answers with a canned result.
#[derive(Debug, Clone, Default)]
pub struct FakePrApi {
    pub submitted: Arc<Mutex<Vec<(RemoteSpec, NewPullRequest, String)>>>,
    pub reject_with: Option<String>,
}

impl FakePrApi {
    pub fn submitted(&self) -> Vec<(RemoteSpec, NewPullRequest, String)> {
        self.submitted.lock().unwrap().clone()
    }
}

impl PullRequestApi for FakePrApi {
    fn create_pull_request(&self, repo: &RemoteSpec, pr: &NewPullRequest, token: &str) -> Result<String> {
        self.submitted
            .lock()
            .unwrap()
            .push((repo.clone(), pr.clone(), token.to_string()));
        match &self.reject_with {
            Some(msg) => Err(PilotError::Upstream(msg.clone())),
            None => Ok(format!("https://github.com/{}/pull/1", repo.full_name())),
        }
    }
}

/// A temporary project directory.
pub fn project() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();
    (dir, path)
}

/// Tools wired to fakes, with a fixed token.
pub fn tools(config: Config, git: &FakeGit, api: &FakePrApi, token: Option<&str>) -> Tools {
    let token = token.map(str::to_string);
    Tools::new(config)
        .with_git(git.clone())
        .with_pr_api(api.clone())
        .with_token_source(move || token.clone())
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}
