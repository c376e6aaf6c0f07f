//! Reduction of per-line records into per-class ratios, and point lookups.

use std::collections::BTreeMap;

use crate::model::{rate, ClassCoverage, CoverageRatio, LineCoverageRecord};
use crate::session::Session;

/// Sum a class's line records and compute its instruction and branch ratios.
#[must_use]
pub fn class_ratio(lines: &[LineCoverageRecord]) -> CoverageRatio {
    // Summed as u128 so u64 counters from the parser cannot overflow.
    let mut covered_ins = 0u128;
    let mut total_ins = 0u128;
    let mut covered_br = 0u128;
    let mut total_br = 0u128;
    for line in lines {
        let (ci, mi) = (u128::from(line.covered_instructions), u128::from(line.missed_instructions));
        let (cb, mb) = (u128::from(line.covered_branches), u128::from(line.missed_branches));
        covered_ins += ci;
        total_ins += ci + mi;
        covered_br += cb;
        total_br += cb + mb;
    }
    CoverageRatio {
        instruction_ratio: rate(covered_ins, total_ins),
        branch_ratio: rate(covered_br, total_br),
    }
}

/// Recompute the ratio of every class in the session's raw coverage.
///
/// Entries are overwritten class by class; classes no longer present in the
/// raw coverage keep their previous ratio. Running this twice over the same
/// raw coverage yields the same map.
pub fn aggregate(session: &mut Session) -> &BTreeMap<String, CoverageRatio> {
    let percentages = session.coverage_percentage.get_or_insert_with(BTreeMap::new);
    for (class_name, lines) in &session.coverage_stats {
        percentages.insert(class_name.clone(), class_ratio(lines));
    }
    percentages
}

/// Look up coverage for `class_name`.
///
/// A class the session knows nothing about is reported as fully covered with
/// no line stats.
#[must_use]
pub fn get_coverage(session: &Session, class_name: &str) -> ClassCoverage {
    let ratio = session
        .coverage_percentage()
        .and_then(|p| p.get(class_name));
    let stats = session.coverage_stats().get(class_name);

    match (ratio, stats) {
        (Some(ratio), Some(stats)) => ClassCoverage {
            class_name: class_name.to_string(),
            instruction_ratio: ratio.instruction_ratio,
            branch_ratio: ratio.branch_ratio,
            stats: Some(stats.clone()),
        },
        // Raw records not yet aggregated: derive the ratio on the fly.
        (None, Some(stats)) => {
            let ratio = class_ratio(stats);
            ClassCoverage {
                class_name: class_name.to_string(),
                instruction_ratio: ratio.instruction_ratio,
                branch_ratio: ratio.branch_ratio,
                stats: Some(stats.clone()),
            }
        }
        (Some(ratio), None) => ClassCoverage {
            class_name: class_name.to_string(),
            instruction_ratio: ratio.instruction_ratio,
            branch_ratio: ratio.branch_ratio,
            stats: None,
        },
        (None, None) => ClassCoverage {
            class_name: class_name.to_string(),
            instruction_ratio: CoverageRatio::FULL.instruction_ratio,
            branch_ratio: CoverageRatio::FULL.branch_ratio,
            stats: None,
        },
    }
}
