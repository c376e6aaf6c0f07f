//! Maven build runs and the parser programs that turn their reports into JSON.
//!
//! Layout expected in the project after a run:
//!   target/surefire-reports/            (written by `mvn test`)
//!   target/site/jacoco/jacoco.xml       (written by `jacoco:report`)
//!
//! Each parser is a jar run as `java -jar <parsers_dir>/<jar> <input>` that
//! prints JSON on stdout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{Config, JACOCO_PARSER_JAR, REVIEW_PARSER_JAR, SUREFIRE_PARSER_JAR};
use crate::coverage;
use crate::error::{PilotError, Result};
use crate::ingest;
use crate::model::{ReviewIssue, TestCaseOutcome, TestRunResult, TestStatus};
use crate::process::{CancelToken, Invocation, ProcessOutput};
use crate::session::Session;

pub fn surefire_reports_dir(project: &Path) -> PathBuf {
    project.join("target").join("surefire-reports")
}

pub fn jacoco_xml_path(project: &Path) -> PathBuf {
    project
        .join("target")
        .join("site")
        .join("jacoco")
        .join("jacoco.xml")
}

/// Outcome of a coverage run. A missing report is a soft `issue`, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRunOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    /// Number of classes ingested.
    pub classes: usize,
}

/// Review findings, capped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewResult {
    pub issues: Vec<ReviewIssue>,
    /// Number of findings before capping.
    pub total: usize,
    pub truncated: bool,
}

fn maven(config: &Config, project: &Path, goals: &[&str], cancel: &CancelToken) -> Invocation {
    Invocation::new(config.maven.clone(), config.build_timeout())
        .args(goals.iter().copied())
        .current_dir(project)
        .cancel_token(cancel.clone())
}

fn run_parser(config: &Config, jar: &str, input: &Path, cancel: &CancelToken) -> Result<ProcessOutput> {
    Invocation::new(config.java.clone(), config.parser_timeout())
        .arg("-jar")
        .arg(config.parser_jar(jar))
        .arg(input)
        .cancel_token(cancel.clone())
        .run_checked()
}

/// Run `mvn clean test` and return the failing and erroring tests.
///
/// Maven exits non-zero when tests fail, so its status is not checked; the
/// surefire report directory decides whether the run produced anything.
pub fn run_tests(session: &Session, config: &Config, cancel: &CancelToken) -> Result<TestRunResult> {
    let project = session.project_dir();
    let build = maven(config, project, &["clean", "test"], cancel).run()?;
    if !build.success() {
        info!(status = %build.status, "maven test run exited non-zero");
    }

    let reports = surefire_reports_dir(project);
    if !reports.is_dir() {
        return Err(PilotError::ReportMissing(reports));
    }

    let parsed = run_parser(config, SUREFIRE_PARSER_JAR, &reports, cancel)?;
    parse_surefire_output(parsed.stdout.as_bytes())
}

/// Run `mvn clean test jacoco:report`, ingest the report and aggregate it into
/// the session.
pub fn run_coverage_report(
    session: &mut Session,
    config: &Config,
    cancel: &CancelToken,
) -> Result<CoverageRunOutcome> {
    let project = session.project_dir().to_path_buf();
    maven(config, &project, &["clean", "test", "jacoco:report"], cancel).run_checked()?;

    let xml = jacoco_xml_path(&project);
    if !xml.is_file() {
        warn!(path = %xml.display(), "jacoco report missing after successful build");
        return Ok(CoverageRunOutcome {
            success: false,
            issue: Some(format!(
                "jacoco.xml not found at {}, tests likely not written yet",
                xml.display()
            )),
            classes: 0,
        });
    }

    let parsed = run_parser(config, JACOCO_PARSER_JAR, &xml, cancel)?;
    let classes = ingest::ingest(session, parsed.stdout.as_bytes())?;
    coverage::aggregate(session);
    info!(classes, "coverage report ingested");

    Ok(CoverageRunOutcome {
        success: true,
        issue: None,
        classes,
    })
}

/// Run the review parser over the project sources.
pub fn run_review_parser(session: &Session, config: &Config, cancel: &CancelToken) -> Result<ReviewResult> {
    let parsed = run_parser(config, REVIEW_PARSER_JAR, session.project_dir(), cancel)?;
    parse_review_output(parsed.stdout.as_bytes(), config.review_issue_cap)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SurefireOutput {
    #[serde(default)]
    class_test_results: BTreeMap<String, Vec<RawTestCase>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTestCase {
    #[serde(default)]
    test_name: String,
    status: TestStatus,
    failure_type: Option<String>,
    failure_message: Option<String>,
}

/// Reshape the surefire parser's `classTestResults` map into a flat list of
/// non-passing tests plus a summary.
pub fn parse_surefire_output(input: &[u8]) -> Result<TestRunResult> {
    let raw: SurefireOutput =
        serde_json::from_slice(input).map_err(|e| PilotError::Parse(e.to_string()))?;

    let mut result = TestRunResult::default();
    for (class_name, cases) in raw.class_test_results {
        let before = result.tests.len();
        for case in cases.into_iter().filter(|c| c.status.is_failure()) {
            match case.status {
                TestStatus::Failed => result.summary.failed += 1,
                _ => result.summary.errored += 1,
            }
            result.tests.push(TestCaseOutcome {
                class_name: class_name.clone(),
                test_name: case.test_name,
                status: case.status,
                failure_type: case.failure_type.filter(|s| !s.is_empty()),
                failure_message: case.failure_message.filter(|s| !s.is_empty()),
            });
        }
        if result.tests.len() > before {
            result.summary.classes += 1;
        }
    }
    Ok(result)
}

/// Parse the review parser's JSON array and keep at most `cap` issues.
pub fn parse_review_output(input: &[u8], cap: usize) -> Result<ReviewResult> {
    let mut issues: Vec<ReviewIssue> =
        serde_json::from_slice(input).map_err(|e| PilotError::Parse(e.to_string()))?;
    let total = issues.len();
    issues.truncate(cap);
    Ok(ReviewResult {
        truncated: total > issues.len(),
        issues,
        total,
    })
}
