//! Leak-check results surfaced through unmount() and run().

use e2e_tests::{banner, testexe_config, TestBinaries, TestMount};
use fusevisor_common::SupervisorError;
use fusevisor_process::{run, RunOptions};
use fusevisor_state::ReadinessState;
use fusevisor_supervisor::ProcessSupervisor;
use std::time::Duration;

fn bins() -> TestBinaries {
    TestBinaries::new(env!("CARGO_BIN_EXE_testexe"), env!("CARGO_BIN_EXE_fakegrind"))
}

#[tokio::test]
async fn test_leak_report_fails_unmount() {
    banner("Diagnostic Failure");

    let bins = bins();
    let mount = TestMount::new();
    let tool = bins.fakegrind_tool(&["--fake-errors=2", "--fake-contexts=1"]);
    let mut sv = ProcessSupervisor::new(testexe_config(&bins, &mount, &[], Some(tool))).unwrap();

    sv.mount().await.unwrap();
    let err = sv
        .unmount(Some(Duration::from_secs(10)))
        .await
        .expect_err("leaks must fail the unmount");

    match err {
        SupervisorError::DiagnosticFailure {
            errors,
            contexts,
            ref log,
        } => {
            assert_eq!(errors, 2);
            assert_eq!(contexts, 1);
            assert!(log.contains("definitely lost in loss record 2 of 2"));
            assert!(log.contains("ERROR SUMMARY: 2 errors from 1 contexts"));
        }
        ref other => panic!("expected DiagnosticFailure, got {other}"),
    }

    // The daemon itself shut down cleanly.
    assert_eq!(sv.state(), ReadinessState::Stopped);
    sv.verify().unwrap();
}

#[tokio::test]
async fn test_broken_tool_is_internal_error() {
    banner("Broken leak-check tool");

    let bins = bins();
    let mount = TestMount::new();
    let tool = bins.fakegrind_tool(&["--fake-no-summary"]);
    let mut sv = ProcessSupervisor::new(testexe_config(&bins, &mount, &[], Some(tool))).unwrap();

    sv.mount().await.unwrap();
    let err = sv.unmount(Some(Duration::from_secs(10))).await.unwrap_err();
    assert!(matches!(err, SupervisorError::InternalTool { .. }));
}

#[tokio::test]
async fn test_run_under_wrapper() {
    banner("run() under leak-check wrapper");

    let bins = bins();
    let clean = RunOptions::checked().with_diagnostics(bins.fakegrind_tool(&[]));
    let outcome = run(&bins.testexe, &["--print", "formatted", "--no-ready"], &clean)
        .await
        .unwrap();
    assert_eq!(outcome.stdout, "formatted\n");

    let leaky = RunOptions::default().with_diagnostics(bins.fakegrind_tool(&["--fake-errors=1"]));
    let err = run(&bins.testexe, &["--no-ready"], &leaky).await.unwrap_err();
    assert!(err.diagnostic_log().unwrap().contains("ERROR SUMMARY: 1 errors"));
}

#[tokio::test]
async fn test_checked_run_reports_failure_before_log() {
    banner("run() check with failing command");

    let bins = bins();
    let options = RunOptions::checked().with_diagnostics(bins.fakegrind_tool(&[]));
    let err = run(&bins.testexe, &["--no-ready", "--exit-code", "4"], &options)
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::CommandFailed { exit_code: Some(4), .. }));
}
