//! Git workflow for the bound project: status, staging with a `.gitignore`
//! bootstrap, coverage-annotated commits and pushes.
//!
//! Repository mutations go through the [`GitClient`] trait; [`CliGit`] drives
//! the `git` executable.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{PilotError, Result};
use crate::process::{CancelToken, Invocation};
use crate::session::Session;

pub const GITIGNORE: &str = ".gitignore";

/// Written to `.gitignore` when the project has none.
pub const DEFAULT_GITIGNORE: &str = "\
### Java ###
# Compiled class file
*.class

# Log file
*.log

# BlueJ files
*.ctxt

# Mobile Tools for Java (J2ME)
.mtj.tmp/

# Package Files #
*.jar
*.war
*.nar
*.ear
*.zip
*.tar.gz
*.rar

# virtual machine crash logs
hs_err_pid*
replay_pid*

### Maven ###
target/
pom.xml.tag
pom.xml.releaseBackup
pom.xml.versionsBackup
pom.xml.next
release.properties
dependency-reduced-pom.xml
buildNumber.properties
.mvn/timing.properties
.mvn/wrapper/maven-wrapper.jar

### Eclipse ###
.project
.classpath
.settings/

### IntelliJ ###
.idea/
*.iml

### VisualStudioCode ###
.vscode/*
!.vscode/settings.json
!.vscode/tasks.json
!.vscode/launch.json
!.vscode/extensions.json
!.vscode/*.code-snippets
.history/
*.vsix
";

const NO_COVERAGE_MARKER: &str = "[No coverage data available]";

/// Operations the workflow needs from a git implementation.
pub trait GitClient {
    /// Porcelain status entries of the work tree.
    fn status(&self, repo: &Path) -> Result<Vec<StatusEntry>>;

    /// Paths staged relative to `HEAD`. A repository without commits has no
    /// `HEAD`; implementations report that as an empty list.
    fn staged_against_head(&self, repo: &Path) -> Result<Vec<String>>;

    /// Stage every change in the work tree.
    fn add_all(&self, repo: &Path) -> Result<()>;

    /// Paths currently in the index that differ from `HEAD` (or all indexed
    /// paths when there is no `HEAD`).
    fn staged_files(&self, repo: &Path) -> Result<Vec<String>>;

    /// Commit the index and return the new commit id.
    fn commit(&self, repo: &Path, message: &str) -> Result<String>;

    /// Name of the checked-out branch. Fails on a detached `HEAD`.
    fn current_branch(&self, repo: &Path) -> Result<String>;

    /// Push `branch` to `remote`, setting upstream tracking.
    fn push(&self, repo: &Path, remote: &str, branch: &str) -> Result<()>;

    /// URLs of the configured remotes, in configuration order.
    fn remote_urls(&self, repo: &Path) -> Result<Vec<String>>;
}

/// One line of `git status --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Index status character.
    pub index: char,
    /// Work-tree status character.
    pub worktree: char,
    pub path: String,
}

impl StatusEntry {
    pub fn is_conflicted(&self) -> bool {
        matches!(
            (self.index, self.worktree),
            ('D', 'D') | ('A', 'U') | ('U', 'D') | ('U', 'A') | ('D', 'U') | ('A', 'A') | ('U', 'U')
        )
    }
}

/// Parse `git status --porcelain=v1 -z` output.
pub fn parse_porcelain(raw: &str) -> Vec<StatusEntry> {
    let mut entries = Vec::new();
    let mut tokens = raw.split('\0').filter(|t| !t.is_empty());
    while let Some(token) = tokens.next() {
        let mut chars = token.chars();
        let (Some(index), Some(worktree)) = (chars.next(), chars.next()) else {
            continue;
        };
        let Some(path) = token.get(3..) else {
            continue;
        };
        // Renames and copies carry the original path as the next token.
        if matches!(index, 'R' | 'C') {
            tokens.next();
        }
        entries.push(StatusEntry {
            index,
            worktree,
            path: path.to_string(),
        });
    }
    entries
}

fn split_nul(raw: &str) -> Vec<String> {
    raw.split('\0')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// [`GitClient`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct CliGit {
    program: String,
    timeout: std::time::Duration,
    cancel: CancelToken,
    envs: Vec<(String, String)>,
}

impl CliGit {
    pub fn new(config: &Config, cancel: CancelToken) -> Self {
        Self {
            program: config.git.clone(),
            timeout: config.git_timeout(),
            cancel,
            envs: Vec::new(),
        }
    }

    /// Set an extra environment variable on every git invocation.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn git(&self, repo: &Path, args: &[&str]) -> Invocation {
        let invocation = self
            .envs
            .iter()
            .fold(Invocation::new(self.program.clone(), self.timeout), |inv, (k, v)| {
                inv.env(k, v)
            });
        invocation
            .args(args.iter().copied())
            .current_dir(repo)
            // Never block on a credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            // Error text is matched in English.
            .env("LC_ALL", "C")
            .cancel_token(self.cancel.clone())
    }

    fn run(&self, repo: &Path, args: &[&str]) -> Result<String> {
        match self.git(repo, args).run_checked() {
            Ok(out) => Ok(out.stdout),
            Err(PilotError::ToolFailed { detail, .. }) => Err(PilotError::Git(detail)),
            Err(e) => Err(e),
        }
    }
}

impl GitClient for CliGit {
    fn status(&self, repo: &Path) -> Result<Vec<StatusEntry>> {
        let out = self.run(repo, &["status", "--porcelain=v1", "-z", "--untracked-files=all"])?;
        Ok(parse_porcelain(&out))
    }

    fn staged_against_head(&self, repo: &Path) -> Result<Vec<String>> {
        let out = self.git(repo, &["diff", "--cached", "--name-only", "-z", "HEAD"]).run()?;
        if out.success() {
            return Ok(split_nul(&out.stdout));
        }
        let detail = out.diagnostic();
        if is_missing_head(&detail) {
            debug!("no HEAD yet, reporting no staged changes");
            Ok(Vec::new())
        } else {
            Err(PilotError::Git(detail))
        }
    }

    fn add_all(&self, repo: &Path) -> Result<()> {
        self.run(repo, &["add", "--all", "."]).map(|_| ())
    }

    fn staged_files(&self, repo: &Path) -> Result<Vec<String>> {
        let out = self.run(repo, &["diff", "--cached", "--name-only", "-z"])?;
        Ok(split_nul(&out))
    }

    fn commit(&self, repo: &Path, message: &str) -> Result<String> {
        self.run(repo, &["commit", "-m", message])?;
        let head = self.run(repo, &["rev-parse", "HEAD"])?;
        Ok(head.trim().to_string())
    }

    fn current_branch(&self, repo: &Path) -> Result<String> {
        let out = self.git(repo, &["symbolic-ref", "--short", "-q", "HEAD"]).run()?;
        let branch = out.stdout.trim();
        if out.success() && !branch.is_empty() {
            Ok(branch.to_string())
        } else if out.stderr.trim().is_empty() {
            Err(PilotError::Git("HEAD is detached, no current branch".to_string()))
        } else {
            Err(PilotError::Git(out.diagnostic()))
        }
    }

    fn push(&self, repo: &Path, remote: &str, branch: &str) -> Result<()> {
        self.run(repo, &["push", "--set-upstream", remote, branch])
            .map(|_| ())
    }

    fn remote_urls(&self, repo: &Path) -> Result<Vec<String>> {
        let out = self
            .git(repo, &["config", "--get-regexp", r"^remote\..*\.url$"])
            .run()?;
        // `git config` exits 1 when nothing matches.
        if !out.success() {
            return match out.status.code() {
                Some(1) => Ok(Vec::new()),
                _ => Err(PilotError::Git(out.diagnostic())),
            };
        }
        Ok(out
            .stdout
            .lines()
            .filter_map(|line| line.split_once(' ').map(|(_, url)| url.trim().to_string()))
            .filter(|url| !url.is_empty())
            .collect())
    }
}

fn is_missing_head(detail: &str) -> bool {
    ["bad revision 'HEAD'", "unknown revision", "ambiguous argument 'HEAD'"]
        .iter()
        .any(|needle| detail.contains(needle))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitStatus {
    pub clean: bool,
    pub staged_changes: Vec<String>,
    pub conflicts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub added: bool,
    pub files_staged: Vec<String>,
    pub gitignore_created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitResult {
    pub committed: bool,
    pub message: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushResult {
    pub pushed: bool,
    pub remote: String,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn status(session: &Session, git: &dyn GitClient) -> Result<GitStatus> {
    let repo = session.project_dir();
    let entries = git.status(repo)?;
    let staged_changes = git.staged_against_head(repo)?;
    let conflicts = entries
        .iter()
        .filter(|e| e.is_conflicted())
        .map(|e| e.path.clone())
        .collect();
    Ok(GitStatus {
        clean: entries.is_empty(),
        staged_changes,
        conflicts,
    })
}

/// Create `.gitignore` with [`DEFAULT_GITIGNORE`] unless one already exists.
/// Returns whether the file was created.
pub fn bootstrap_gitignore(project: &Path) -> Result<bool> {
    let path = project.join(GITIGNORE);
    match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(mut file) => {
            file.write_all(DEFAULT_GITIGNORE.as_bytes())?;
            info!(path = %path.display(), "created default .gitignore");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub fn stage_all(session: &Session, git: &dyn GitClient) -> Result<StageResult> {
    let repo = session.project_dir();
    let gitignore_created = bootstrap_gitignore(repo)?;
    git.add_all(repo)?;
    let files_staged = git.staged_files(repo)?;
    debug!(count = files_staged.len(), "staged files");
    Ok(StageResult {
        added: !files_staged.is_empty(),
        files_staged,
        gitignore_created,
    })
}

/// The coverage section appended to commit messages.
pub fn coverage_summary(session: &Session) -> String {
    match session.coverage_percentage() {
        Some(percentages) => {
            let lines: Vec<String> = percentages
                .iter()
                .map(|(class, ratio)| {
                    format!(
                        "  {class}: {:.1} line, {:.1} branch",
                        ratio.instruction_ratio, ratio.branch_ratio
                    )
                })
                .collect();
            format!("\n\nCoverage Summary:\n{}", lines.join("\n"))
        }
        None => format!("\n\n{NO_COVERAGE_MARKER}"),
    }
}

pub fn build_commit_message(session: &Session, message: &str) -> String {
    format!("{}{}", message.trim(), coverage_summary(session))
}

pub fn commit(session: &Session, git: &dyn GitClient, message: &str) -> Result<CommitResult> {
    if message.trim().is_empty() {
        return Err(PilotError::Validation("Commit message cannot be empty".to_string()));
    }
    let full_message = build_commit_message(session, message);
    let hash = git.commit(session.project_dir(), &full_message)?;
    info!(%hash, "committed");
    Ok(CommitResult {
        committed: true,
        message: full_message,
        hash,
    })
}

/// Push the current branch. A rejected push is reported in the result, not
/// as an error.
pub fn push(session: &Session, git: &dyn GitClient, remote: &str) -> Result<PushResult> {
    let repo = session.project_dir();
    let branch = git.current_branch(repo)?;
    let error = match git.push(repo, remote, &branch) {
        Ok(()) => {
            info!(%remote, %branch, "pushed");
            None
        }
        Err(e) => {
            warn!(%remote, %branch, error = %e, "push failed");
            Some(e.to_string())
        }
    };
    Ok(PushResult {
        pushed: error.is_none(),
        remote: remote.to_string(),
        branch,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage;
    use crate::model::LineCoverageRecord;
    use crate::session::SessionRegistry;

    #[test]
    fn parse_porcelain_handles_renames_and_conflicts() {
        let raw = " M src/Main.java\0?? notes.txt\0R  new.txt\0old.txt\0UU pom.xml\0AA both.txt\0";
        let entries = parse_porcelain(raw);
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["src/Main.java", "notes.txt", "new.txt", "pom.xml", "both.txt"]);

        let conflicts: Vec<_> = entries
            .iter()
            .filter(|e| e.is_conflicted())
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(conflicts, ["pom.xml", "both.txt"]);
    }

    #[test]
    fn parse_porcelain_empty_is_clean() {
        assert!(parse_porcelain("").is_empty());
    }

    #[test]
    fn missing_head_detection() {
        assert!(is_missing_head(
            "fatal: ambiguous argument 'HEAD': unknown revision or path not in the working tree."
        ));
        assert!(is_missing_head("fatal: bad revision 'HEAD'"));
        assert!(!is_missing_head("fatal: not a git repository"));
    }

    #[test]
    fn gitignore_created_once_and_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        assert!(bootstrap_gitignore(dir.path()).unwrap());
        let path = dir.path().join(GITIGNORE);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_GITIGNORE);

        std::fs::write(&path, "custom\n").unwrap();
        assert!(!bootstrap_gitignore(dir.path()).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "custom\n");
    }

    #[test]
    fn default_gitignore_covers_build_and_ide_output() {
        for rule in ["target/", "*.class", "*.jar", ".idea/", ".classpath"] {
            assert!(DEFAULT_GITIGNORE.lines().any(|l| l == rule), "{rule}");
        }
    }

    #[test]
    fn commit_message_without_coverage_has_marker() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = SessionRegistry::new();
        let session = registry.initialize(dir.path()).unwrap();

        let msg = build_commit_message(session, "  feat: add parser \n");
        assert_eq!(msg, "feat: add parser\n\n[No coverage data available]");
    }

    #[test]
    fn commit_message_lists_each_class() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = SessionRegistry::new();
        registry.initialize(dir.path()).unwrap();
        let session = registry.require_mut().unwrap();
        session.coverage_stats.insert(
            "A".to_string(),
            vec![LineCoverageRecord {
                line_number: Some(1),
                covered_instructions: 9,
                missed_instructions: 1,
                covered_branches: 4,
                missed_branches: 1,
            }],
        );
        session.coverage_stats.insert("B".to_string(), Vec::new());
        coverage::aggregate(session);

        let msg = build_commit_message(session, "test: cover A");
        assert_eq!(
            msg,
            "test: cover A\n\nCoverage Summary:\n  A: 0.9 line, 0.8 branch\n  B: 1.0 line, 1.0 branch"
        );
    }

    #[test]
    fn aggregated_but_empty_coverage_has_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = SessionRegistry::new();
        registry.initialize(dir.path()).unwrap();
        let session = registry.require_mut().unwrap();
        coverage::aggregate(session);

        assert_eq!(coverage_summary(session), "\n\nCoverage Summary:\n");
    }
}
