//! A daemon that exits before announcing readiness.

use e2e_tests::{banner, init_logging, testexe_config, TestBinaries, TestMount};
use fusevisor_common::SupervisorError;
use fusevisor_state::ReadinessState;
use fusevisor_supervisor::ProcessSupervisor;
use std::time::Duration;

fn bins() -> TestBinaries {
    TestBinaries::new(env!("CARGO_BIN_EXE_testexe"), env!("CARGO_BIN_EXE_fakegrind"))
}

#[tokio::test]
async fn test_premature_exit() {
    banner("Premature Exit");
    init_logging();

    let bins = bins();
    let mount = TestMount::new();
    let config = testexe_config(
        &bins,
        &mount,
        &["--no-ready", "--exit-code", "1"],
        Some(bins.fakegrind_tool(&[])),
    );
    let mut sv = ProcessSupervisor::new(config).unwrap();

    let err = sv.mount().await.expect_err("mount must fail");
    match err {
        SupervisorError::ReadinessTimeout { ref pattern, ref captured } => {
            assert_eq!(pattern, r"Fuse mount initialized\.$");
            assert!(captured.starts_with("fusemount -f "));
        }
        ref other => panic!("expected ReadinessTimeout, got {other}"),
    }
    println!("✓ mount failed: {err}\n");

    assert_eq!(sv.state(), ReadinessState::Failed);
    assert_eq!(sv.exit_code(), Some(1));

    let err = sv
        .unmount(Some(Duration::from_secs(1)))
        .await
        .expect_err("unmount is not allowed after a failed mount");
    assert!(matches!(err, SupervisorError::InvalidState { .. }));
    assert_eq!(sv.state(), ReadinessState::Failed);
}

#[tokio::test]
async fn test_wrong_readiness_line() {
    banner("Wrong readiness line");

    let bins = bins();
    let mount = TestMount::new();
    let config = testexe_config(
        &bins,
        &mount,
        &["--ready-line", "  Fuse mount initialized.", "--run-duration", "1"],
        None,
    );
    let mut sv = ProcessSupervisor::new(config).unwrap();

    // The indented line never matches, and the daemon exits after 1s.
    let err = sv.mount().await.unwrap_err();
    assert!(err.captured_output().unwrap().contains("  Fuse mount initialized.\n"));
    assert_eq!(sv.exit_code(), Some(0));
}

#[tokio::test]
async fn test_missing_program_fails_spawn() {
    banner("Missing daemon binary");

    let bins = bins();
    let mount = TestMount::new();
    let mut config = testexe_config(&bins, &mount, &[], None);
    config.program = "fusevisor-no-such-daemon".to_string();
    let mut sv = ProcessSupervisor::new(config).unwrap();

    assert!(matches!(
        sv.mount().await,
        Err(SupervisorError::SpawnFailed { .. })
    ));
    assert_eq!(sv.state(), ReadinessState::Failed);
}
