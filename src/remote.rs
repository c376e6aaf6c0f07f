//! Resolution of a git remote URL into the `(owner, repo)` pair used by the
//! hosting service's API.
//!
//! URL shapes live in [`PROVIDERS`]; adding a hosting layout means adding a
//! row there.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{PilotError, Result};

/// `owner/repo` of a remote repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    pub owner: String,
    pub repo: String,
}

impl RemoteSpec {
    /// `owner/repo`, as used in REST paths.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// A named URL pattern with `owner` and `repo` capture groups.
pub struct Provider {
    pub name: &'static str,
    pub pattern: &'static str,
}

pub const PROVIDERS: &[Provider] = &[
    Provider {
        name: "https",
        pattern: r"^https?://[^/]+/(?P<owner>[^/]+)/(?P<repo>[^/]+?)(?:\.git)?/?$",
    },
    Provider {
        name: "scp",
        pattern: r"^git@[^:]+:(?P<owner>[^/]+)/(?P<repo>[^/]+?)(?:\.git)?/?$",
    },
    Provider {
        name: "ssh",
        pattern: r"^ssh://(?:[^@/]+@)?[^/]+/(?P<owner>[^/]+)/(?P<repo>[^/]+?)(?:\.git)?/?$",
    },
];

fn compiled() -> &'static [(&'static str, Regex)] {
    static TABLE: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        PROVIDERS
            .iter()
            .filter_map(|p| Regex::new(p.pattern).ok().map(|re| (p.name, re)))
            .collect()
    })
}

/// Extract `(owner, repo)` from a remote URL.
pub fn resolve(url: &str) -> Result<RemoteSpec> {
    let url = url.trim();
    compiled()
        .iter()
        .find_map(|(_, re)| {
            let caps = re.captures(url)?;
            Some(RemoteSpec {
                owner: caps["owner"].to_string(),
                repo: caps["repo"].to_string(),
            })
        })
        .ok_or_else(|| PilotError::UnparsableRemote(url.to_string()))
}

/// Resolve the first of `remote_urls`. Only the first configured remote is
/// considered; others are ignored even if the first cannot be parsed.
pub fn resolve_first(remote_urls: &[String]) -> Result<RemoteSpec> {
    let first = remote_urls.first().ok_or(PilotError::NoRemote)?;
    resolve(first)
}
