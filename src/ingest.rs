use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{PilotError, Result};
use crate::model::LineCoverageRecord;
use crate::session::Session;

/// Key under which the coverage parser nests its per-class map.
const WRAPPER_KEY: &str = "fileCoverages";

/// Per-class line records, keyed by fully qualified class name.
pub type CoverageStats = BTreeMap<String, Vec<LineCoverageRecord>>;

/// Parse the coverage parser's JSON output into per-class line records.
///
/// Accepts either `{"fileCoverages": {class: [record, ...]}}` or the bare
/// class map. Every record must carry all four counters.
pub fn parse_coverage_payload(input: &[u8]) -> Result<CoverageStats> {
    let root: Value =
        serde_json::from_slice(input).map_err(|e| PilotError::Parse(e.to_string()))?;

    let classes = match root {
        Value::Object(mut map) => match map.remove(WRAPPER_KEY) {
            Some(Value::Object(inner)) => inner,
            Some(_) => {
                return Err(PilotError::MalformedReport(format!(
                    "'{WRAPPER_KEY}' is not an object"
                )))
            }
            None => map,
        },
        _ => {
            return Err(PilotError::MalformedReport(
                "expected an object of class coverages".to_string(),
            ))
        }
    };

    let mut stats = CoverageStats::new();
    for (class_name, lines) in classes {
        let Value::Array(lines) = lines else {
            return Err(PilotError::MalformedReport(format!(
                "{class_name}: expected an array of line records"
            )));
        };
        let records = lines
            .into_iter()
            .enumerate()
            .map(|(idx, line)| {
                serde_json::from_value::<LineCoverageRecord>(line).map_err(|e| {
                    PilotError::MalformedReport(format!("{class_name} record {idx}: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        stats.insert(class_name, records);
    }

    Ok(stats)
}

/// Parse `input` and store it verbatim as the session's raw coverage.
/// On error the session is left untouched. Returns the number of classes.
pub fn ingest(session: &mut Session, input: &[u8]) -> Result<usize> {
    let stats = parse_coverage_payload(input)?;
    let classes = stats.len();
    debug!(classes, "ingested coverage payload");
    session.coverage_stats = stats;
    Ok(classes)
}
