//! Mount, unmount and verify a well-behaved daemon under the leak-check
//! wrapper.

use e2e_tests::{banner, init_logging, testexe_config, TestBinaries, TestMount};
use fusevisor_fixture::Timestamp;
use fusevisor_process::process_exists;
use fusevisor_state::ReadinessState;
use fusevisor_supervisor::ProcessSupervisor;
use std::time::Duration;

fn bins() -> TestBinaries {
    TestBinaries::new(env!("CARGO_BIN_EXE_testexe"), env!("CARGO_BIN_EXE_fakegrind"))
}

#[tokio::test]
async fn test_mount_unmount_verify() {
    banner("Mount / Unmount / Verify");
    init_logging();

    let bins = bins();
    let mount = TestMount::new();
    let config = testexe_config(&bins, &mount, &["--after-ready", "op 1"], Some(bins.fakegrind_tool(&[])));
    let mut sv = ProcessSupervisor::new(config).expect("config is valid");

    println!("Step 1: mounting...");
    let ts = Timestamp::start().await;
    sv.mount().await.expect("mount should succeed");
    let range = ts.finish().await;

    let expected_prefix = format!(
        "fusemount -f {} {}\nFuse mount initialized.\n",
        mount.device.display(),
        mount.mountpoint.display()
    );
    assert_eq!(sv.readiness_prefix(), Some(expected_prefix.as_str()));
    assert_eq!(sv.state(), ReadinessState::Ready);
    assert!(process_exists(sv.pid().unwrap()).unwrap(), "daemon must still run after mount()");
    let log_path = sv.diagnostic_log_path().expect("wrapper log").to_path_buf();
    let history = sv.status_handle().history();
    let ready_at = history.last().unwrap().timestamp;
    assert!(range.contains(ready_at));
    println!("✓ mounted\n");

    println!("Step 2: unmounting...");
    let report = sv.unmount(Some(Duration::from_secs(10))).await.expect("unmount should succeed");
    assert!(!report.forced);
    let diag = report.diagnostics.expect("leak check ran");
    assert!(diag.is_clean());
    assert!(diag.log().contains("Memcheck"));
    assert_eq!(sv.state(), ReadinessState::Stopped);
    println!("✓ unmounted in {:?}\n", report.elapsed);

    println!("Step 3: verifying...");
    assert_eq!(sv.stdout(), Some(format!("{expected_prefix}op 1\n").as_str()));
    sv.verify().expect("outcome should verify");
    assert!(log_path.exists());
    println!("✓ verified");

    drop(sv);
    assert!(!log_path.exists(), "wrapper log is removed with the supervisor");
}

#[tokio::test]
async fn test_mount_without_wrapper() {
    banner("Mount without leak-check wrapper");

    let bins = bins();
    let mount = TestMount::new();
    let mut sv = ProcessSupervisor::new(testexe_config(&bins, &mount, &[], None)).unwrap();

    sv.mount().await.unwrap();
    assert!(sv.diagnostic_log_path().is_none());

    let report = sv.unmount(None).await.unwrap();
    assert!(report.diagnostics.is_none());
    sv.verify().unwrap();
}

#[tokio::test]
async fn test_nonzero_exit_fails_verify() {
    banner("Non-zero exit fails verify");

    let bins = bins();
    let mount = TestMount::new();
    let config = testexe_config(&bins, &mount, &["--exit-code", "2"], Some(bins.fakegrind_tool(&[])));
    let mut sv = ProcessSupervisor::new(config).unwrap();

    sv.mount().await.unwrap();
    sv.unmount(Some(Duration::from_secs(10))).await.unwrap();

    assert_eq!(sv.exit_code(), Some(2));
    assert_eq!(
        sv.verify(),
        Err(fusevisor_common::OutcomeAssertion::ExitCode {
            expected: 0,
            actual: Some(2)
        })
    );
}

#[tokio::test]
async fn test_stderr_chatter_fails_verify() {
    banner("stderr output fails verify");

    let bins = bins();
    let mount = TestMount::new();
    let config = testexe_config(&bins, &mount, &["--stderr", "fuse: warning"], None);
    let mut sv = ProcessSupervisor::new(config).unwrap();

    sv.mount().await.unwrap();
    sv.unmount(Some(Duration::from_secs(10))).await.unwrap();

    assert!(matches!(
        sv.verify(),
        Err(fusevisor_common::OutcomeAssertion::StderrNotEmpty { .. })
    ));
}
