//! Saving, loading, replaying and minimizing counterexamples.

use actor_sim::{
    minimize, replay_artifact, replay_artifact_path, ArtifactError, BugKind, MinimizeConfig,
    ReproArtifact, TestEngine, Verdict,
};

use crate::init_tracing;
use crate::lost_update::{lost_update, random_config};

fn failing_artifact() -> ReproArtifact {
    let config = random_config();
    let report = TestEngine::new(config.clone()).explore(&lost_update).unwrap();
    let found = report.first_bug().expect("lost update");
    ReproArtifact::from_outcome(&config, &found.outcome).expect("buggy outcome")
}

#[test]
fn artifact_round_trips_through_disk() {
    init_tracing();
    let artifact = failing_artifact();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lost_update.json");
    artifact.save(&path).unwrap();

    let loaded = ReproArtifact::load(&path).unwrap();
    assert_eq!(loaded, artifact);

    let outcome = replay_artifact_path(&lost_update, &path).unwrap();
    assert_eq!(outcome.verdict, Verdict::AssertionFailure);
    assert_eq!(outcome.bug_kind(), Some(BugKind::Assertion));
    assert_eq!(outcome.trace, artifact.trace);
}

#[test]
fn tampered_trace_hash_is_rejected() {
    init_tracing();
    let mut artifact = failing_artifact();
    artifact.expected_trace_hash ^= 1;
    let err = replay_artifact(&lost_update, &artifact).unwrap_err();
    assert!(matches!(err, ArtifactError::HashMismatch { .. }), "{err}");
}

#[test]
fn artifact_json_names_the_bug() {
    init_tracing();
    let artifact = failing_artifact();
    let json = String::from_utf8(artifact.to_json().unwrap()).unwrap();
    assert!(json.contains("\"schema_version\": 1"), "{json}");
    assert!(json.contains("\"kind\": \"Assertion\""), "{json}");
}

#[test]
fn minimized_artifact_still_fails_and_is_no_longer() {
    init_tracing();
    let artifact = failing_artifact();
    let minimized = minimize(&lost_update, &artifact, MinimizeConfig::default()).unwrap();

    assert!(minimized.trace.len() <= artifact.trace.len());
    assert_eq!(minimized.bug.kind, BugKind::Assertion);
    let outcome = replay_artifact(&lost_update, &minimized).unwrap();
    assert_eq!(outcome.verdict, Verdict::AssertionFailure);
}
