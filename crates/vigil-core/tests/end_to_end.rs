use std::path::Path;
use std::sync::Arc;

use vigil_core::fakes::RecordingNotifier;
use vigil_core::{
    Engine, EngineConfig, EngineError, FixOutcome, FsAuditSink, InvocationPayload,
    RemediationStatus, Stage, StageKind, StrategyProfile,
};

const JS_CHECK: &str = "grep -q '^const a = 1;$' app.js || { echo 'SyntaxError: app.js: Missing semicolon. (1:11)'; exit 1; }";

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

fn payload(stages: Vec<Stage>) -> InvocationPayload {
    InvocationPayload {
        stage_config: stages,
        profile: Some(StrategyProfile::Javascript),
        ..Default::default()
    }
}

#[tokio::test]
async fn missing_semicolon_is_repaired_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app.js", "const a = 1\nconsole.log(a);\n");
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = Engine::new(EngineConfig::for_project(dir.path()))
        .unwrap()
        .with_notifier(notifier.clone());

    let outcome = engine
        .remediate(&payload(vec![Stage::new("test", JS_CHECK, StageKind::Test)]))
        .await
        .unwrap();

    let report = &outcome.report;
    assert_eq!(report.status, RemediationStatus::AllFixed);
    assert!(report.all_fixed);
    assert_eq!(report.fixed_count, 1);
    assert_eq!(report.fix_attempts.len(), 1);
    assert_eq!(report.fix_attempts[0].strategy_name, "js-line-repair");
    assert_eq!(report.fix_attempts[0].outcome, FixOutcome::Fixed);

    let fixed = std::fs::read_to_string(dir.path().join("app.js")).unwrap();
    assert_eq!(fixed, "const a = 1;\nconsole.log(a);\n");

    let read = FsAuditSink::read_report(&outcome.stored.path).unwrap();
    assert_eq!(&read, report);

    let audit = FsAuditSink::new(dir.path().join(".vigil"));
    let attempts = std::fs::read_to_string(audit.attempts_path()).unwrap();
    assert_eq!(attempts.lines().count(), 1);

    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(notifier.sent()[0].title, "Auto-Fix: Success");
}

#[tokio::test]
async fn unfixable_build_reports_residual_issue() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = Engine::new(EngineConfig::for_project(dir.path()).with_max_fix_attempts(2))
        .unwrap()
        .with_notifier(notifier.clone());

    let stages = vec![
        Stage::new("test", "echo ok", StageKind::Test),
        Stage::new("build", "echo 'bundle step blew up'; exit 3", StageKind::Build),
    ];
    let outcome = engine.remediate(&payload(stages)).await.unwrap();

    let report = &outcome.report;
    assert_eq!(report.status, RemediationStatus::PartiallyFixed);
    assert_eq!(report.rounds.len(), 2);
    assert_eq!(report.remaining_count, 1);
    assert_eq!(report.stats.total, 2);
    assert_eq!(report.stats.passed, 1);
    assert_eq!(report.residual_issues[0].message, "stage 'build' failed with exit code 3");
    assert!(!report.residual_issues[0].fixable);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, "Auto-Fix: Manual Required");
}

#[tokio::test]
async fn tampered_report_fails_digest_check() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(EngineConfig::for_project(dir.path())).unwrap();

    let outcome = engine
        .remediate(&payload(vec![Stage::new("test", "true", StageKind::Test)]))
        .await
        .unwrap();
    assert_eq!(outcome.report.status, RemediationStatus::Verified);

    let raw = std::fs::read_to_string(&outcome.stored.path).unwrap();
    std::fs::write(&outcome.stored.path, raw.replace("verified", "all_fixed")).unwrap();

    let err = FsAuditSink::read_report(&outcome.stored.path).unwrap_err();
    assert!(matches!(err, EngineError::DigestMismatch { .. }));
}

#[tokio::test]
async fn slow_stage_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(
        EngineConfig::for_project(dir.path())
            .with_stage_timeout_secs(1)
            .with_max_fix_attempts(1),
    )
    .unwrap();

    let outcome = engine
        .remediate(&payload(vec![Stage::new("test", "sleep 5", StageKind::Test)]))
        .await
        .unwrap();

    let stage = &outcome.report.stages_run[0];
    assert!(!stage.succeeded);
    assert_eq!(stage.exit_code, -1);
    assert!(stage.output.contains("timed out after 1s"));
}

#[tokio::test]
async fn gate_blocks_on_real_failures_and_logs_decision() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app.js", "const a = 1\n");
    let engine = Engine::new(EngineConfig::for_project(dir.path())).unwrap();

    let mut blocked = payload(vec![Stage::new("test", JS_CHECK, StageKind::Test)]);
    blocked.trigger = Some("I'm all done here".to_string());
    let decision = engine.gate(&blocked).await;
    assert!(!decision.allowed);
    assert_eq!(decision.blocking_issues.len(), 1);

    // The gate never edits the project.
    let untouched = std::fs::read_to_string(dir.path().join("app.js")).unwrap();
    assert_eq!(untouched, "const a = 1\n");

    let audit = FsAuditSink::new(dir.path().join(".vigil"));
    let gates = std::fs::read_to_string(audit.gates_path()).unwrap();
    assert_eq!(gates.lines().count(), 1);
    assert!(gates.contains("\"blocked\":true"));
}
