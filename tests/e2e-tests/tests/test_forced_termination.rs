//! A daemon that ignores the detach request and has to be killed.

use e2e_tests::{banner, init_logging, testexe_config, TestBinaries, TestMount};
use fusevisor_common::SupervisorError;
use fusevisor_process::process_exists;
use fusevisor_state::ReadinessState;
use fusevisor_supervisor::{ProcessSupervisor, FORCE_KILL_TIMEOUT};
use std::time::{Duration, Instant};

fn bins() -> TestBinaries {
    TestBinaries::new(env!("CARGO_BIN_EXE_testexe"), env!("CARGO_BIN_EXE_fakegrind"))
}

#[tokio::test]
async fn test_forced_termination_without_wrapper() {
    banner("Forced Termination");
    init_logging();

    let bins = bins();
    let mount = TestMount::new();
    let config = testexe_config(&bins, &mount, &["--ignore-term"], None);
    let mut sv = ProcessSupervisor::new(config).unwrap();

    sv.mount().await.unwrap();
    let pid = sv.pid().unwrap();

    let limit = Duration::from_millis(500);
    let started = Instant::now();
    let report = sv.unmount(Some(limit)).await.expect("forced unmount still reaps");
    let elapsed = started.elapsed();

    assert!(report.forced);
    assert!(elapsed >= limit, "killed too early: {elapsed:?}");
    assert!(elapsed < limit + FORCE_KILL_TIMEOUT, "kill took too long: {elapsed:?}");
    assert_eq!(sv.state(), ReadinessState::Failed);
    assert!(!process_exists(pid).unwrap());
    assert!(sv.verify().is_err());
    println!("✓ killed after {elapsed:?}");
}

#[tokio::test]
async fn test_forced_termination_still_verifies_log() {
    banner("Forced Termination with leak-check wrapper");

    let bins = bins();
    let mount = TestMount::new();
    let config = testexe_config(&bins, &mount, &["--ignore-term"], Some(bins.fakegrind_tool(&[])));
    let mut sv = ProcessSupervisor::new(config).unwrap();

    sv.mount().await.unwrap();

    // The kill takes out the wrapper too, so no summary is ever written.
    let err = sv
        .unmount(Some(Duration::from_millis(500)))
        .await
        .expect_err("verification of the empty log must fail");
    assert!(matches!(err, SupervisorError::InternalTool { .. }), "got {err}");
    assert_eq!(sv.state(), ReadinessState::Failed);
    assert!(sv.outcome().is_some());
    assert!(sv
        .status_handle()
        .failure_reason()
        .unwrap()
        .contains("forced termination"));
}

#[tokio::test]
async fn test_run_duration_exit_before_unmount() {
    banner("Daemon exits on its own");

    let bins = bins();
    let mount = TestMount::new();
    let config = testexe_config(&bins, &mount, &["--ignore-term", "--run-duration", "1"], None);
    let mut sv = ProcessSupervisor::new(config).unwrap();

    sv.mount().await.unwrap();
    let report = sv.unmount(Some(Duration::from_secs(10))).await.unwrap();

    assert!(!report.forced);
    assert_eq!(sv.state(), ReadinessState::Stopped);
    sv.verify().unwrap();
}
