//! Named tool calls with JSON arguments, answered with a tagged JSON result.
//!
//! Wire shape, one JSON document per line:
//!   request:  {"id": 7, "tool": "getCoverage", "args": {"className": "org.example.Foo"}}
//!   success:  {"id": 7, "status": "ok", "result": {...}}
//!   failure:  {"id": 7, "status": "error", "kind": "not_initialized", "detail": "..."}
//!
//! A [`Tools`] value is one connection: it owns its own [`SessionRegistry`].
//!
//! `{"tool": "cancel"}` aborts the subprocess of the call in flight. The
//! aborted call answers with kind `cancelled`, then the cancel request itself
//! answers `{"cancelled": true}`.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::coverage;
use crate::error::{ErrorKind, PilotError, Result};
use crate::git::{self, CliGit, CommitResult, GitClient, GitStatus, PushResult, StageResult};
use crate::github::{self, GitHubApi, PullRequestApi, PullRequestArgs, PullRequestResult};
use crate::maven::{self, CoverageRunOutcome, ReviewResult};
use crate::model::{ClassCoverage, TestRunResult};
use crate::process::CancelToken;
use crate::session::SessionRegistry;

/// Every tool name accepted by [`Tools::call`].
pub const TOOL_NAMES: &[&str] = &[
    "initialize",
    "runTests",
    "runCoverageReport",
    "getCoverage",
    "gitStatus",
    "gitStageAll",
    "gitCommit",
    "gitPush",
    "createPullRequest",
    "runReviewParser",
];

/// Request that aborts the running call. Needs no session.
pub const CANCEL_TOOL: &str = "cancel";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok { result: Value },
    Error { kind: ErrorKind, detail: String },
}

impl Response {
    pub fn from_result<T: Serialize>(result: Result<T>) -> Self {
        match result.and_then(|v| serde_json::to_value(v).map_err(|e| PilotError::Parse(e.to_string()))) {
            Ok(result) => Response::Ok { result },
            Err(e) => Response::Error {
                kind: e.kind(),
                detail: e.to_string(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }
}

#[derive(Debug, Deserialize)]
struct Call {
    #[serde(default)]
    id: Option<Value>,
    tool: String,
    #[serde(default)]
    args: Value,
}

#[derive(Serialize)]
struct Reply<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a Value>,
    #[serde(flatten)]
    response: &'a Response,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub resolved_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct InitializeArgs {
    path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetCoverageArgs {
    class_name: String,
}

#[derive(Deserialize)]
struct CommitArgs {
    message: String,
}

#[derive(Deserialize)]
struct PushArgs {
    #[serde(default = "default_remote")]
    remote: String,
}

fn default_remote() -> String {
    "origin".to_string()
}

type TokenSource = Box<dyn Fn() -> Option<String> + Send>;

pub struct Tools {
    config: Config,
    registry: SessionRegistry,
    git: Box<dyn GitClient + Send>,
    pr_api: Box<dyn PullRequestApi + Send>,
    token: TokenSource,
    cancel: CancelToken,
}

impl Tools {
    /// Tools backed by the `git` executable and the GitHub REST API, with the
    /// token read from the environment on each pull-request call.
    pub fn new(config: Config) -> Self {
        let cancel = CancelToken::new();
        let git = CliGit::new(&config, cancel.clone());
        let pr_api = GitHubApi::new(&config.github_api_url, config.http_timeout());
        let token_config = config.clone();
        Self {
            config,
            registry: SessionRegistry::new(),
            git: Box::new(git),
            pr_api: Box::new(pr_api),
            token: Box::new(move || token_config.github_token()),
            cancel,
        }
    }

    pub fn with_git(mut self, git: impl GitClient + Send + 'static) -> Self {
        self.git = Box::new(git);
        self
    }

    pub fn with_pr_api(mut self, api: impl PullRequestApi + Send + 'static) -> Self {
        self.pr_api = Box::new(api);
        self
    }

    pub fn with_token_source(mut self, source: impl Fn() -> Option<String> + Send + 'static) -> Self {
        self.token = Box::new(source);
        self
    }

    /// Token that aborts any running subprocess when cancelled. It is cleared
    /// once a call has been aborted by it.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn initialize(&mut self, path: &str) -> Result<InitializeResult> {
        let session = self.registry.initialize(path)?;
        Ok(InitializeResult {
            resolved_path: session.project_dir().to_path_buf(),
        })
    }

    pub fn run_tests(&self) -> Result<TestRunResult> {
        maven::run_tests(self.registry.require()?, &self.config, &self.cancel)
    }

    pub fn run_coverage_report(&mut self) -> Result<CoverageRunOutcome> {
        let session = self.registry.require_mut()?;
        maven::run_coverage_report(session, &self.config, &self.cancel)
    }

    pub fn get_coverage(&self, class_name: &str) -> Result<ClassCoverage> {
        Ok(coverage::get_coverage(self.registry.require()?, class_name))
    }

    pub fn git_status(&self) -> Result<GitStatus> {
        git::status(self.registry.require()?, self.git.as_ref())
    }

    pub fn git_stage_all(&self) -> Result<StageResult> {
        git::stage_all(self.registry.require()?, self.git.as_ref())
    }

    pub fn git_commit(&self, message: &str) -> Result<CommitResult> {
        git::commit(self.registry.require()?, self.git.as_ref(), message)
    }

    pub fn git_push(&self, remote: &str) -> Result<PushResult> {
        git::push(self.registry.require()?, self.git.as_ref(), remote)
    }

    pub fn create_pull_request(&self, args: &PullRequestArgs) -> Result<PullRequestResult> {
        github::validate(&args.title, &args.body)?;
        let session = self.registry.require()?;
        let token = (self.token)();
        github::create_pull_request(
            session,
            self.git.as_ref(),
            self.pr_api.as_ref(),
            token.as_deref(),
            &self.config.token_env,
            args,
        )
    }

    pub fn run_review_parser(&self) -> Result<ReviewResult> {
        maven::run_review_parser(self.registry.require()?, &self.config, &self.cancel)
    }

    /// Dispatch a named tool. Never fails: errors come back as
    /// [`Response::Error`].
    pub fn call(&mut self, tool: &str, args: Value) -> Response {
        debug!(tool, "tool call");
        let response = match tool {
            "initialize" => Response::from_result(
                parse_args::<InitializeArgs>(args).and_then(|a| self.initialize(&a.path)),
            ),
            "runTests" => Response::from_result(self.run_tests()),
            "runCoverageReport" => Response::from_result(self.run_coverage_report()),
            "getCoverage" => Response::from_result(
                parse_args::<GetCoverageArgs>(args).and_then(|a| self.get_coverage(&a.class_name)),
            ),
            "gitStatus" => Response::from_result(self.git_status()),
            "gitStageAll" => Response::from_result(self.git_stage_all()),
            "gitCommit" => Response::from_result(
                parse_args::<CommitArgs>(args).and_then(|a| self.git_commit(&a.message)),
            ),
            "gitPush" => Response::from_result(
                parse_args::<PushArgs>(args).and_then(|a| self.git_push(&a.remote)),
            ),
            "createPullRequest" => Response::from_result(
                parse_args::<PullRequestArgs>(args).and_then(|a| self.create_pull_request(&a)),
            ),
            "runReviewParser" => Response::from_result(self.run_review_parser()),
            CANCEL_TOOL => {
                self.cancel.reset();
                Response::Ok {
                    result: json!({ "cancelled": true }),
                }
            }
            other => Response::Error {
                kind: ErrorKind::Validation,
                detail: format!("Unknown tool '{other}'. Available: {}", TOOL_NAMES.join(", ")),
            },
        };
        if let Response::Error { kind, detail } = &response {
            info!(tool, ?kind, %detail, "tool failed");
            if *kind == ErrorKind::Cancelled {
                self.cancel.reset();
            }
        }
        response
    }

    /// Answer one JSON request line.
    pub fn call_line(&mut self, line: &str) -> String {
        let (id, response) = match serde_json::from_str::<Call>(line) {
            Ok(call) => {
                let response = self.call(&call.tool, call.args);
                (call.id, response)
            }
            Err(e) => (
                None,
                Response::Error {
                    kind: ErrorKind::Validation,
                    detail: format!("Invalid request: {e}"),
                },
            ),
        };
        let reply = Reply {
            id: id.as_ref(),
            response: &response,
        };
        serde_json::to_string(&reply).unwrap_or_else(|e| {
            format!(r#"{{"status":"error","kind":"parse_failed","detail":"{e}"}}"#)
        })
    }

    /// Serve JSON-lines requests from `input` until EOF.
    ///
    /// Input is read on its own thread so a cancel request is seen while a
    /// call is still running. Replies are written in request order.
    pub fn serve<R, W>(&mut self, input: R, mut output: W) -> std::io::Result<()>
    where
        R: BufRead + Send + 'static,
        W: Write,
    {
        let cancel = self.cancel.clone();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in input.lines() {
                if let Ok(text) = &line {
                    if is_cancel_request(text) {
                        cancel.cancel();
                    }
                }
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        for line in rx {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let reply = self.call_line(&line);
            writeln!(output, "{reply}")?;
            output.flush()?;
        }
        warn!("input closed, stopping");
        Ok(())
    }
}

fn is_cancel_request(line: &str) -> bool {
    serde_json::from_str::<Call>(line).is_ok_and(|call| call.tool == CANCEL_TOOL)
}

/// Deserialize tool arguments. Missing or `null` args count as `{}`.
fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = match args {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| PilotError::Validation(format!("Invalid arguments: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_args_treats_null_as_empty_object() {
        let push: PushArgs = parse_args(Value::Null).unwrap();
        assert_eq!(push.remote, "origin");
    }

    #[test]
    fn parse_args_rejects_wrong_types() {
        let err = parse_args::<InitializeArgs>(json!({"path": 42})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn cancel_request_detection() {
        assert!(is_cancel_request(r#"{"id": 3, "tool": "cancel"}"#));
        assert!(!is_cancel_request(r#"{"tool": "runTests"}"#));
        assert!(!is_cancel_request("cancel"));
    }

    #[test]
    fn cancel_needs_no_session_and_clears_the_token() {
        let mut tools = Tools::new(Config::default());
        tools.cancel_token().cancel();
        let response = tools.call(CANCEL_TOOL, Value::Null);
        assert_eq!(response, Response::Ok { result: json!({"cancelled": true}) });
        assert!(!tools.cancel_token().is_cancelled());
    }

    #[test]
    fn response_error_shape() {
        let resp = Response::from_result::<()>(Err(PilotError::NotInitialized));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "not_initialized");
    }

    #[test]
    fn reply_echoes_id_and_flattens_response() {
        let response = Response::Ok { result: json!({"x": 1}) };
        let id = json!(7);
        let reply = serde_json::to_value(Reply {
            id: Some(&id),
            response: &response,
        })
        .unwrap();
        assert_eq!(reply, json!({"id": 7, "status": "ok", "result": {"x": 1}}));
    }
}
