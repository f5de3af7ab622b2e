//! Metrics record loading.
//!
//! GREEN when:
//! - The newest record per candidate wins, ordered by the parsed timestamp in
//!   the file name (not by string sort or file mtime).
//! - Both record shapes (nested "metrics" object, flat top level) normalize
//!   to the same canonical metric map, with nested taking precedence.
//! - File names whose stamp does not parse are skipped, so one candidate's
//!   prefix cannot capture another candidate's records.
//! - A name with no records is absent (not an error); an entirely empty
//!   result is NoCandidatesFound.

use mrk_candidates::{load_candidates, CandidatesError};
use std::fs;
use std::path::Path;

fn write_record(dir: &Path, file_name: &str, contents: &str) {
    fs::write(dir.join(file_name), contents).unwrap();
}

fn names(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[test]
fn newest_record_by_parsed_stamp_wins() {
    let tmp = tempfile::tempdir().unwrap();
    write_record(
        tmp.path(),
        "candidate_hgb_20240101T000000Z.json",
        r#"{"metrics": {"pr_auc": 0.70}, "artifact": "old.bin"}"#,
    );
    write_record(
        tmp.path(),
        "candidate_hgb_20240102T120000Z.json",
        r#"{"metrics": {"pr_auc": 0.88}, "artifact": "new.bin"}"#,
    );

    let set = load_candidates(tmp.path(), &names(&["candidate_hgb"])).unwrap();
    assert_eq!(set.len(), 1);
    let c = &set.candidates()[0];
    assert_eq!(c.metrics.get("pr_auc"), Some(&0.88), "newest record must win");
    assert_eq!(c.artifact.as_deref(), Some("new.bin"));
    assert!(c
        .source_path
        .ends_with("candidate_hgb_20240102T120000Z.json"));
}

#[test]
fn flat_and_nested_shapes_normalize_identically() {
    let tmp = tempfile::tempdir().unwrap();
    write_record(
        tmp.path(),
        "flat_20240101T000000Z.json",
        r#"{"pr_auc": 0.81, "roc_auc": 0.9, "artifact": "flat.bin"}"#,
    );
    write_record(
        tmp.path(),
        "nested_20240101T000000Z.json",
        r#"{"metrics": {"pr_auc": 0.81, "roc_auc": 0.9}, "artifact": "nested.bin"}"#,
    );

    let set = load_candidates(tmp.path(), &names(&["flat", "nested"])).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(
        set.candidates()[0].metrics, set.candidates()[1].metrics,
        "both shapes must produce the same canonical metric map"
    );
}

#[test]
fn nested_metrics_object_takes_precedence_over_top_level() {
    let tmp = tempfile::tempdir().unwrap();
    // pr_auc appears both nested and flat; the nested mapping wins.
    write_record(
        tmp.path(),
        "model_20240101T000000Z.json",
        r#"{"metrics": {"pr_auc": 0.5}, "pr_auc": 0.9, "artifact": "m.bin"}"#,
    );

    let set = load_candidates(tmp.path(), &names(&["model"])).unwrap();
    assert_eq!(set.candidates()[0].metrics.get("pr_auc"), Some(&0.5));
}

#[test]
fn non_numeric_metric_values_are_dropped() {
    let tmp = tempfile::tempdir().unwrap();
    write_record(
        tmp.path(),
        "model_20240101T000000Z.json",
        r#"{"metrics": {"pr_auc": "not-a-number", "roc_auc": "0.75"}, "artifact": "m.bin"}"#,
    );

    let set = load_candidates(tmp.path(), &names(&["model"])).unwrap();
    let c = &set.candidates()[0];
    assert_eq!(c.metrics.get("pr_auc"), None, "unparseable value behaves as missing");
    assert_eq!(
        c.metrics.get("roc_auc"),
        Some(&0.75),
        "numeric strings parse (some producers stringify scores)"
    );
}

#[test]
fn invalid_stamp_is_skipped_and_prefix_cannot_cross_match() {
    let tmp = tempfile::tempdir().unwrap();
    // "baseline" must not pick up baseline_logreg's records: the remainder
    // after "baseline_" is "logreg_20240101T000000Z", which is not a stamp.
    write_record(
        tmp.path(),
        "baseline_logreg_20240101T000000Z.json",
        r#"{"pr_auc": 0.81, "artifact": "baseline.bin"}"#,
    );
    write_record(
        tmp.path(),
        "baseline_not-a-stamp.json",
        r#"{"pr_auc": 0.99, "artifact": "bogus.bin"}"#,
    );

    let err = load_candidates(tmp.path(), &names(&["baseline"])).unwrap_err();
    assert!(
        matches!(err, CandidatesError::NoCandidatesFound { .. }),
        "got: {err}"
    );

    let set = load_candidates(tmp.path(), &names(&["baseline_logreg"])).unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set.candidates()[0].artifact.as_deref(), Some("baseline.bin"));
}

#[test]
fn absent_candidate_is_skipped_not_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    write_record(
        tmp.path(),
        "candidate_hgb_20240101T000000Z.json",
        r#"{"pr_auc": 0.88, "artifact": "candidate.bin"}"#,
    );

    let set =
        load_candidates(tmp.path(), &names(&["baseline_logreg", "candidate_hgb"])).unwrap();
    assert_eq!(set.len(), 1, "missing baseline is simply absent");
    assert_eq!(set.candidates()[0].name, "candidate_hgb");
}

#[test]
fn missing_artifact_field_is_legal_at_load_time() {
    let tmp = tempfile::tempdir().unwrap();
    write_record(
        tmp.path(),
        "model_20240101T000000Z.json",
        r#"{"metrics": {"pr_auc": 0.6}}"#,
    );
    write_record(
        tmp.path(),
        "other_20240101T000000Z.json",
        r#"{"metrics": {"pr_auc": 0.4}, "artifact": ""}"#,
    );

    let set = load_candidates(tmp.path(), &names(&["model", "other"])).unwrap();
    assert_eq!(set.candidates()[0].artifact, None);
    assert_eq!(
        set.candidates()[1].artifact,
        None,
        "empty artifact reference is treated as undeclared"
    );
}

#[test]
fn empty_result_is_no_candidates_found() {
    let tmp = tempfile::tempdir().unwrap();
    let err = load_candidates(tmp.path(), &names(&["baseline_logreg"])).unwrap_err();
    assert!(matches!(err, CandidatesError::NoCandidatesFound { .. }));

    // A metrics dir that does not exist yet behaves the same way.
    let err = load_candidates(&tmp.path().join("nope"), &names(&["x"])).unwrap_err();
    assert!(matches!(err, CandidatesError::NoCandidatesFound { .. }));
}

#[test]
fn corrupt_selected_record_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    write_record(tmp.path(), "model_20240101T000000Z.json", "{not json");

    let err = load_candidates(tmp.path(), &names(&["model"])).unwrap_err();
    assert!(matches!(err, CandidatesError::Parse { .. }), "got: {err}");
}
