//! A corrupt registry must stop the run, untouched.
//!
//! GREEN when:
//! - Promotion against an unparseable state file fails with the corrupt
//!   kind and the file's bytes are exactly preserved.
//! - No registry copies land for the aborted run (the corruption check runs
//!   before anything is copied).
//! - `RegistryStore::load` reports the same failure directly.

use mrk_candidates::Candidate;
use mrk_registry::{promote, RegistryError, RegistryStore};
use mrk_selector::Selection;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

fn selection_for(name: &str, score: f64, models_dir: &Path, metrics_dir: &Path) -> Selection {
    fs::create_dir_all(models_dir).unwrap();
    fs::create_dir_all(metrics_dir).unwrap();

    let artifact_name = format!("{name}.bin");
    fs::write(models_dir.join(&artifact_name), b"weights").unwrap();

    let record_path = metrics_dir.join(format!("{name}_20240101T000000Z.json"));
    fs::write(
        &record_path,
        format!(r#"{{"metrics": {{"pr_auc": {score}}}, "artifact": "{artifact_name}"}}"#),
    )
    .unwrap();

    Selection {
        winner: Candidate {
            name: name.to_string(),
            metrics: BTreeMap::from([("pr_auc".to_string(), score)]),
            artifact: Some(artifact_name),
            source_path: record_path,
        },
        score,
    }
}

#[test]
fn corrupt_state_file_aborts_and_is_preserved() {
    let tmp = tempfile::tempdir().unwrap();
    let models = tmp.path().join("models");
    let metrics = tmp.path().join("metrics");
    let registry = tmp.path().join("registry");

    fs::create_dir_all(&registry).unwrap();
    let garbage = r#"{"models": [{"name": "half-written"#;
    fs::write(registry.join("model_registry.json"), garbage).unwrap();

    let selection = selection_for("candidate_hgb", 0.88, &models, &metrics);
    let err = promote(
        &selection,
        "pr_auc",
        &models,
        &registry,
        "production_latest.bin",
    )
    .unwrap_err();
    assert!(matches!(err, RegistryError::Corrupt { .. }), "got: {err}");

    // The corrupt file is surfaced, never "repaired" by overwriting.
    let preserved = fs::read_to_string(registry.join("model_registry.json")).unwrap();
    assert_eq!(preserved, garbage, "corrupt state must be left for the operator");

    // Zero orphans: corruption is detected before any copy lands.
    let copies: Vec<String> = fs::read_dir(&registry)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|n| n != "model_registry.json")
        .collect();
    assert!(copies.is_empty(), "unexpected files in registry: {copies:?}");

    assert!(!models.join("production_latest.bin").exists());
}

#[test]
fn load_reports_corrupt_directly() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("model_registry.json"), "not json at all").unwrap();

    let err = RegistryStore::open(tmp.path()).load().unwrap_err();
    match err {
        RegistryError::Corrupt { path, .. } => {
            assert!(path.ends_with("model_registry.json"));
        }
        other => panic!("expected Corrupt, got {other:?}"),
    }
}

#[test]
fn absent_state_file_is_an_empty_registry() {
    let tmp = tempfile::tempdir().unwrap();
    let state = RegistryStore::open(tmp.path().join("never-created"))
        .load()
        .unwrap();
    assert!(state.models.is_empty());
    assert!(state.production.is_none());
}
