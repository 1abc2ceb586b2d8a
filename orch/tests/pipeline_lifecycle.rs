//! Whole-pipeline tests driven through the scripted runner.
//!
//! No process is spawned here; every tool and verify call is answered by
//! `ScriptedRunner`, so these tests pin down ledger contents and artifact
//! layout rather than shell behavior.

use std::fs;

use orch::core::record::LedgerRecord;
use orch::core::step::Step;
use orch::error::{OrchError, exit_code_for};
use orch::exit_codes;
use orch::io::invoke::ProcessOutput;
use orch::io::ledger::Ledger;
use orch::io::run_dir::RunPaths;
use orch::pipeline::run_feature;
use orch::test_support::{STATUS_REPORT, ScriptedRunner, TestRepo, failed_output, ok_output};

fn happy_runner() -> ScriptedRunner {
    let runner = ScriptedRunner::new();
    runner.on("codex /status", vec![ok_output(STATUS_REPORT)]);
    runner.on("codex ", vec![ok_output("# Plan\n\n## Steps\n1. do it\n")]);
    runner.on("claude ", vec![ok_output("changed src/login.py\n")]);
    runner.on("pytest", vec![ok_output("4 passed in 0.12s\n")]);
    runner
}

/// A successful run leaves one artifact per step, and the intake copy is
/// byte-identical to the feature document.
#[test]
fn successful_run_writes_full_artifact_tree() {
    let repo = TestRepo::new().expect("repo");
    let doc = "# F-001: Login\n\nUsers can log in with email.\n";
    repo.write_feature("F-001", doc).expect("feature");
    let settings = repo.settings();
    let runner = happy_runner();

    let outcome = run_feature("F-001", &settings, &runner).expect("run");
    let paths = RunPaths::new(&outcome.run_dir);

    assert!(outcome.run_id.starts_with("F-001-"));
    assert_eq!(outcome.run_dir, settings.runs_path().join(&outcome.run_id));
    assert_eq!(fs::read_to_string(&paths.intake_feature_path).expect("intake"), doc);
    assert_eq!(
        fs::read_to_string(&paths.plan_path).expect("plan"),
        "# Plan\n\n## Steps\n1. do it\n"
    );
    assert!(paths.execute_output_path.is_file());
    assert_eq!(
        fs::read_to_string(&paths.verify_path).expect("verify"),
        "4 passed in 0.12s\n"
    );
    assert!(paths.review_path.is_file());
    for label in ["pre-plan", "post-plan", "pre-review", "post-review"] {
        assert!(paths.status_raw_path(label).is_file(), "{label} txt");
        assert!(paths.status_parsed_path(label).is_file(), "{label} json");
    }
    assert!(!outcome.run_dir.join("fix").exists());
    assert_eq!(outcome.report_path, paths.report_path);
}

#[test]
fn ledger_opens_with_run_identity_and_micro_timestamps() {
    let repo = TestRepo::new().expect("repo");
    repo.write_feature("F-001", "# Login\n").expect("feature");
    let settings = repo.settings();
    let runner = happy_runner();

    let outcome = run_feature("F-001", &settings, &runner).expect("run");

    let entries = Ledger::new(outcome.run_dir.join("ledger.jsonl"))
        .entries()
        .expect("entries");
    assert!(
        entries
            .iter()
            .all(|entry| entry.ts.timestamp_subsec_nanos() % 1_000 == 0)
    );

    let opening = match &entries[0].record {
        LedgerRecord::Intake(intake) => intake.clone(),
        other => panic!("expected INTAKE, got {other:?}"),
    };
    assert_eq!(opening.feature_id, "F-001");
    assert_eq!(opening.run_id, outcome.run_id);
    assert_eq!(opening.artifact, None);
}

#[test]
fn repeated_runs_get_distinct_directories() {
    let repo = TestRepo::new().expect("repo");
    repo.write_feature("F-001", "# Login\n").expect("feature");
    let settings = repo.settings();

    let first = run_feature("F-001", &settings, &happy_runner()).expect("first");
    let second = run_feature("F-001", &settings, &happy_runner()).expect("second");

    assert_ne!(first.run_id, second.run_id);
    assert!(first.report_path.is_file());
    assert!(second.report_path.is_file());
}

#[test]
fn verify_stderr_lands_in_artifact() {
    let repo = TestRepo::new().expect("repo");
    repo.write_feature("F-001", "# Login\n").expect("feature");
    let settings = repo.settings();
    let runner = happy_runner();
    runner.on(
        "python",
        vec![ProcessOutput {
            returncode: 0,
            stdout: "ok".to_string(),
            stderr: "DeprecationWarning".to_string(),
            timed_out: false,
        }],
    );
    let settings = orch::io::config::Settings {
        verify_command: "python -m pytest -q".to_string(),
        ..settings
    };

    let outcome = run_feature("F-001", &settings, &runner).expect("run");

    let verify = fs::read_to_string(RunPaths::new(&outcome.run_dir).verify_path).expect("verify");
    assert_eq!(verify, "ok\nDeprecationWarning");
}

#[test]
fn exhausted_fix_loop_maps_to_its_exit_code() {
    let repo = TestRepo::new().expect("repo");
    repo.write_feature("F-001", "# Login\n").expect("feature");
    let settings = repo.settings();
    let runner = ScriptedRunner::new();
    runner.on("codex /status", vec![ok_output(STATUS_REPORT)]);
    runner.on("pytest", vec![failed_output(1, "FAILED test_login\n")]);

    let err = run_feature("F-001", &settings, &runner).unwrap_err();

    assert_eq!(exit_code_for(&err), exit_codes::FIX_LOOP_EXHAUSTED);
    assert_eq!(
        runner.count_prefix("pytest"),
        1 + settings.max_fix_iterations as usize
    );
}

#[test]
fn tool_timeout_stops_the_run_with_abort_record() {
    let repo = TestRepo::new().expect("repo");
    repo.write_feature("F-001", "# Login\n").expect("feature");
    let settings = orch::io::config::Settings {
        tool_timeout_secs: Some(30),
        ..repo.settings()
    };
    let runner = ScriptedRunner::new();
    runner.on("codex /status", vec![ok_output(STATUS_REPORT)]);
    runner.on(
        "codex ",
        vec![ProcessOutput {
            returncode: -1,
            timed_out: true,
            ..ProcessOutput::default()
        }],
    );

    let err = run_feature("F-001", &settings, &runner).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<OrchError>(),
        Some(OrchError::TimedOut { .. })
    ));
    assert_eq!(exit_code_for(&err), exit_codes::FAILED);

    let run_dir = fs::read_dir(settings.runs_path())
        .expect("runs")
        .next()
        .expect("one run")
        .expect("entry")
        .path();
    let entries = Ledger::new(run_dir.join("ledger.jsonl"))
        .entries()
        .expect("entries");
    let steps: Vec<Step> = entries.iter().map(|e| e.record.step()).collect();
    assert_eq!(
        steps,
        vec![Step::Intake, Step::Intake, Step::CodexStatus, Step::Abort]
    );
}
