//! Pull-request creation on GitHub for the project's current branch.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PilotError, Result};
use crate::git::GitClient;
use crate::remote::{self, RemoteSpec};
use crate::session::Session;

/// Title prefixes accepted as-is; anything else gets `feat: ` prepended.
pub const CONVENTIONAL_PREFIXES: &[&str] = &["feat", "fix", "refactor", "docs", "style", "test"];

const DEFAULT_PREFIX: &str = "feat";

/// A pull request ready to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// Caller-supplied pull-request fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestArgs {
    pub title: String,
    pub body: String,
    #[serde(default = "default_base")]
    pub base: String,
}

fn default_base() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestResult {
    pub pr_url: String,
}

/// The hosting service's pull-request endpoint.
pub trait PullRequestApi {
    /// Create the pull request and return its web URL.
    fn create_pull_request(&self, repo: &RemoteSpec, pr: &NewPullRequest, token: &str) -> Result<String>;
}

/// Reject blank titles and bodies.
pub fn validate(title: &str, body: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(PilotError::Validation("Title cannot be empty".to_string()));
    }
    if body.trim().is_empty() {
        return Err(PilotError::Validation("Body cannot be empty".to_string()));
    }
    Ok(())
}

/// Prepend `feat: ` unless the title already starts with a conventional
/// prefix (case-insensitive).
pub fn normalize_title(title: &str) -> String {
    let title = title.trim();
    let has_prefix = CONVENTIONAL_PREFIXES.iter().any(|prefix| {
        title
            .get(..prefix.len() + 1)
            .is_some_and(|head| head.eq_ignore_ascii_case(&format!("{prefix}:")))
    });
    if has_prefix {
        title.to_string()
    } else {
        format!("{DEFAULT_PREFIX}: {title}")
    }
}

/// Open a pull request from the current branch into `base`.
///
/// `token` is read by the caller from the environment; `None` fails with
/// [`PilotError::MissingCredentials`] naming `token_var`.
pub fn create_pull_request(
    session: &Session,
    git: &dyn GitClient,
    api: &dyn PullRequestApi,
    token: Option<&str>,
    token_var: &str,
    args: &PullRequestArgs,
) -> Result<PullRequestResult> {
    validate(&args.title, &args.body)?;

    let repo_dir = session.project_dir();
    let head = git.current_branch(repo_dir)?;
    let spec = remote::resolve_first(&git.remote_urls(repo_dir)?)?;
    let pr = NewPullRequest {
        title: normalize_title(&args.title),
        body: args.body.clone(),
        head,
        base: args.base.clone(),
    };

    let token = token.ok_or_else(|| PilotError::MissingCredentials(token_var.to_string()))?;

    info!(repo = %spec.full_name(), head = %pr.head, base = %pr.base, "creating pull request");
    let pr_url = api.create_pull_request(&spec, &pr, token)?;
    Ok(PullRequestResult { pr_url })
}

/// [`PullRequestApi`] over the GitHub REST API.
pub struct GitHubApi {
    agent: ureq::Agent,
    api_url: String,
}

impl GitHubApi {
    pub fn new(api_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            agent,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct CreatedPullRequest {
    html_url: String,
}

impl PullRequestApi for GitHubApi {
    fn create_pull_request(&self, repo: &RemoteSpec, pr: &NewPullRequest, token: &str) -> Result<String> {
        let url = format!("{}/repos/{}/pulls", self.api_url, repo.full_name());
        let resp = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {token}"))
            .set("Accept", "application/vnd.github+json")
            .set("User-Agent", "mvnpilot")
            .set("X-GitHub-Api-Version", "2022-11-28")
            .send_json(serde_json::json!({
                "title": pr.title,
                "body": pr.body,
                "head": pr.head,
                "base": pr.base,
            }));

        match resp {
            Ok(resp) => {
                let created: CreatedPullRequest = resp.into_json().map_err(|e| {
                    PilotError::Upstream(format!("Failed to read pull request response: {e}"))
                })?;
                Ok(created.html_url)
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                warn!(code, "GitHub rejected pull request");
                Err(PilotError::Upstream(format!(
                    "Failed to create pull request (HTTP {code}): {}",
                    error_message(&body)
                )))
            }
            Err(e) => Err(PilotError::Upstream(format!("Failed to create pull request: {e}"))),
        }
    }
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Pull GitHub's `message` (and any nested error messages) out of an error
/// body, falling back to the raw body.
fn error_message(body: &str) -> String {
    let Ok(err) = serde_json::from_str::<ApiError>(body) else {
        return body.trim().to_string();
    };
    let mut parts: Vec<String> = err.message.into_iter().collect();
    parts.extend(err.errors.into_iter().filter_map(|e| e.message));
    if parts.is_empty() {
        body.trim().to_string()
    } else {
        parts.join(": ")
    }
}
