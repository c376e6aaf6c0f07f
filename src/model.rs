//! Shapes exchanged with the parser programs and returned to callers.
//! Serialized field names are camelCase to match the parsers' JSON.

use serde::{Deserialize, Serialize};

/// Ratio reported when nothing was instrumented: a class with no
/// instructions (or no branches) counts as fully covered.
pub const VACUOUS_COVERAGE: f64 = 1.0;

/// Compute a coverage ratio, returning [`VACUOUS_COVERAGE`] when the total is zero.
#[must_use]
pub fn rate(covered: u128, total: u128) -> f64 {
    if total == 0 {
        VACUOUS_COVERAGE
    } else {
        covered as f64 / total as f64
    }
}

/// One instrumented source line as emitted by the coverage parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineCoverageRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    pub covered_instructions: u64,
    pub missed_instructions: u64,
    pub covered_branches: u64,
    pub missed_branches: u64,
}

/// Per-class instruction and branch ratios, both in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageRatio {
    pub instruction_ratio: f64,
    pub branch_ratio: f64,
}

impl CoverageRatio {
    pub const FULL: CoverageRatio = CoverageRatio {
        instruction_ratio: VACUOUS_COVERAGE,
        branch_ratio: VACUOUS_COVERAGE,
    };
}

/// Answer to a coverage lookup for a single class.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCoverage {
    pub class_name: String,
    pub instruction_ratio: f64,
    pub branch_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Vec<LineCoverageRecord>>,
}

/// Outcome of a single test case in a surefire report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
    Skipped,
}

impl TestStatus {
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, TestStatus::Failed | TestStatus::Error)
    }
}

/// A non-passing test case.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseOutcome {
    pub class_name: String,
    pub test_name: String,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

/// Counts over the non-passing tests of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestSummary {
    pub failed: usize,
    pub errored: usize,
    /// Number of test classes with at least one failure or error.
    pub classes: usize,
}

/// Result of a test run. Passing tests are not listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TestRunResult {
    pub summary: TestSummary,
    pub tests: Vec<TestCaseOutcome>,
}

/// A static-analysis finding from the review parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewIssue {
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub line: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub rule: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_vacuous_for_zero_total() {
        assert_eq!(rate(0, 0), VACUOUS_COVERAGE);
        assert_eq!(rate(3, 4), 0.75);
    }

    #[test]
    fn class_coverage_omits_missing_stats() {
        let cov = ClassCoverage {
            class_name: "org.example.Foo".to_string(),
            instruction_ratio: 1.0,
            branch_ratio: 1.0,
            stats: None,
        };
        let json = serde_json::to_value(&cov).unwrap();
        assert_eq!(json["className"], "org.example.Foo");
        assert!(json.get("stats").is_none());
    }

    #[test]
    fn line_record_requires_all_counters() {
        let ok: LineCoverageRecord = serde_json::from_str(
            r#"{"lineNumber":4,"coveredInstructions":3,"missedInstructions":1,"coveredBranches":0,"missedBranches":0}"#,
        )
        .unwrap();
        assert_eq!(ok.line_number, Some(4));

        let missing = serde_json::from_str::<LineCoverageRecord>(
            r#"{"coveredInstructions":3,"missedInstructions":1,"coveredBranches":0}"#,
        );
        assert!(missing.is_err());
    }
}
