//! Configuration loading for mvnpilot.
//!
//! Reads `mvnpilot.toml` from the working directory (or an explicit path).
//! A missing file yields the defaults; CLI flags are applied on top by the caller.
//! A `.env` file in the working directory can supply the GitHub token.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "mvnpilot.toml";

pub const ENV_FILE_NAME: &str = ".env";

pub const SUREFIRE_PARSER_JAR: &str = "surefireParser.jar";
pub const JACOCO_PARSER_JAR: &str = "jacocoParser.jar";
pub const REVIEW_PARSER_JAR: &str = "reviewParser.jar";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maven executable.
    pub maven: String,

    /// Java executable used to run the parser jars.
    pub java: String,

    /// Git executable.
    pub git: String,

    /// Directory holding the parser jars. Relative paths resolve against the
    /// process working directory, not the project.
    pub parsers_dir: PathBuf,

    pub build_timeout_secs: u64,
    pub parser_timeout_secs: u64,
    pub git_timeout_secs: u64,
    pub http_timeout_secs: u64,

    pub github_api_url: String,

    /// Environment variable holding the GitHub token. `GITHUB_TOKEN` is
    /// consulted when this one is unset.
    pub token_env: String,

    /// Maximum number of review issues returned.
    pub review_issue_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            maven: "mvn".to_string(),
            java: "java".to_string(),
            git: "git".to_string(),
            parsers_dir: PathBuf::from("parsers"),
            build_timeout_secs: 1800,
            parser_timeout_secs: 300,
            git_timeout_secs: 120,
            http_timeout_secs: 30,
            github_api_url: "https://api.github.com".to_string(),
            token_env: "GH_PAT".to_string(),
            review_issue_cap: 100,
        }
    }
}

impl Config {
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn parser_timeout(&self) -> Duration {
        Duration::from_secs(self.parser_timeout_secs)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn parser_jar(&self, jar: &str) -> PathBuf {
        self.parsers_dir.join(jar)
    }

    /// Read the GitHub token from the configured variable, then `GITHUB_TOKEN`.
    pub fn github_token(&self) -> Option<String> {
        [self.token_env.as_str(), "GITHUB_TOKEN"]
            .into_iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|token| !token.trim().is_empty())
    }
}

/// Load the config from `explicit`, or from `mvnpilot.toml` in `cwd` if present.
pub fn load(explicit: Option<&Path>, cwd: &Path) -> anyhow::Result<Config> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let candidate = cwd.join(CONFIG_FILE_NAME);
            if !candidate.is_file() {
                debug!("no {} found, using defaults", CONFIG_FILE_NAME);
                return Ok(Config::default());
            }
            candidate
        }
    };

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: Config = toml::from_str(&text)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Load `.env` from `dir` into the process environment, if present.
/// Variables that are already set keep their value. Returns whether a file
/// was loaded.
pub fn load_env_file(dir: &Path) -> anyhow::Result<bool> {
    let path = dir.join(ENV_FILE_NAME);
    if !path.is_file() {
        return Ok(false);
    }
    dotenvy::from_path(&path).with_context(|| format!("Failed to load {}", path.display()))?;
    debug!(path = %path.display(), "loaded environment file");
    Ok(true)
}
