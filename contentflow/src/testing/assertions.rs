//! Test assertions for pipeline results.

use crate::core::{StageId, StageResults, StageStatus};

/// Asserts that a stage ended with the expected status.
pub fn assert_stage_status(results: &StageResults, stage: StageId, expected: StageStatus) {
    let actual = results.get(&stage).map(|r| r.status);
    assert_eq!(
        actual,
        Some(expected),
        "Expected stage '{stage}' to be {expected}, got {actual:?}"
    );
}

/// Asserts that a stage completed.
pub fn assert_stage_completed(results: &StageResults, stage: StageId) {
    assert_stage_status(results, stage, StageStatus::Completed);
}

/// Asserts that a stage was skipped with a reason mentioning `cause`.
pub fn assert_stage_skipped_by(results: &StageResults, stage: StageId, cause: &str) {
    assert_stage_status(results, stage, StageStatus::Skipped);
    let reason = results
        .get(&stage)
        .and_then(|r| r.error.clone())
        .unwrap_or_default();
    assert!(
        reason.contains(cause),
        "Expected skip reason of '{stage}' to mention '{cause}', got '{reason}'"
    );
}

/// Asserts that every result is in a terminal status.
pub fn assert_all_terminal(results: &StageResults) {
    for (stage, result) in results {
        assert!(
            result.status.is_terminal(),
            "Stage '{stage}' ended in non-terminal status {}",
            result.status
        );
    }
}

/// Asserts that the results cover exactly the given stages.
pub fn assert_result_stages(results: &StageResults, expected: &[StageId]) {
    let mut actual: Vec<StageId> = results.keys().copied().collect();
    actual.sort();
    let mut expected = expected.to_vec();
    expected.sort();
    assert_eq!(actual, expected, "Unexpected set of stages in results");
}
