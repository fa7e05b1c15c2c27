//! Tests for remote file deployment against the scripted cluster.

mod common;

use std::sync::Arc;

use common::{ExecResponse, FakeCluster};
use kubesniff::{Error, ExecTarget, FileDeployer, UploadOutcome};

const BINARY: &[u8] = b"\x7fELF static capture binary";
const REMOTE: &str = "/tmp/static-tcpdump";

fn target() -> ExecTarget {
    ExecTarget::new("shop", "web-0", "app")
}

fn deployer(cluster: &Arc<FakeCluster>) -> FileDeployer {
    FileDeployer::new(cluster.clone())
}

// =============================================================================
// Ensure Present
// =============================================================================

#[tokio::test]
async fn test_uploads_missing_file() {
    let cluster = Arc::new(FakeCluster::new());

    let outcome = deployer(&cluster)
        .ensure_present(BINARY, REMOTE, &target())
        .await
        .unwrap();

    assert_eq!(outcome, UploadOutcome::Uploaded { bytes: BINARY.len() });
    assert!(cluster.has_file(REMOTE));
    assert_eq!(
        cluster.exec_lines(),
        vec![
            "/bin/sh -c ls -alt /tmp/static-tcpdump",
            "tar -xf - -C /tmp",
            "/bin/sh -c ls -alt /tmp/static-tcpdump",
        ]
    );

    let extraction = &cluster.execs()[1];
    assert_eq!(extraction.target, target());
    assert!(extraction.stdin.as_ref().is_some_and(|tar| tar.len() % 512 == 0));
}

#[tokio::test]
async fn test_ensure_present_is_idempotent() {
    let cluster = Arc::new(FakeCluster::new());
    let deployer = deployer(&cluster);

    let first = deployer.ensure_present(BINARY, REMOTE, &target()).await.unwrap();
    let second = deployer.ensure_present(BINARY, REMOTE, &target()).await.unwrap();

    assert!(matches!(first, UploadOutcome::Uploaded { .. }));
    assert_eq!(second, UploadOutcome::AlreadyPresent);
    assert_eq!(cluster.count_execs("tar -xf -"), 1);
}

#[tokio::test]
async fn test_present_file_is_not_sent() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.add_file(REMOTE);

    let outcome = deployer(&cluster)
        .ensure_present(BINARY, REMOTE, &target())
        .await
        .unwrap();

    assert_eq!(outcome, UploadOutcome::AlreadyPresent);
    assert_eq!(cluster.exec_lines().len(), 1);
}

#[tokio::test]
async fn test_bare_file_name_extracts_in_working_dir() {
    let cluster = Arc::new(FakeCluster::new());

    deployer(&cluster)
        .ensure_present(BINARY, "tcpdump", &target())
        .await
        .unwrap();

    assert_eq!(cluster.count_execs("tar -xf -"), 1);
    assert_eq!(cluster.count_execs("-C"), 0);
    assert!(cluster.has_file("tcpdump"));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_lost_extraction_is_unverifiable() {
    let cluster = Arc::new(FakeCluster::new().losing_extractions());

    let err = deployer(&cluster)
        .ensure_present(BINARY, REMOTE, &target())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UploadUnverifiable { ref path } if path == REMOTE));
}

#[tokio::test]
async fn test_failed_extraction_carries_exit_code_and_stderr() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.respond("tar -xf -", ExecResponse::failure(2, "tar: read-only file system"));

    let err = deployer(&cluster)
        .ensure_present(BINARY, REMOTE, &target())
        .await
        .unwrap_err();

    match err {
        Error::RemoteCommandFailed {
            command,
            exit_code,
            stderr,
        } => {
            assert_eq!(command, "tar -xf - -C /tmp");
            assert_eq!(exit_code, 2);
            assert_eq!(stderr, "tar: read-only file system");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unexpected_existence_check_exit_is_an_error() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.respond("ls -alt", ExecResponse::failure(127, "sh: ls: not found"));

    let err = deployer(&cluster)
        .ensure_present(BINARY, REMOTE, &target())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RemoteCommandFailed { exit_code: 127, .. }));
    assert_eq!(cluster.count_execs("tar"), 0);
}

#[tokio::test]
async fn test_existence_check_with_stderr_is_an_error() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.respond(
        "ls -alt",
        ExecResponse {
            exit_code: 0,
            stdout: Vec::new(),
            stderr: "ls: cannot access '/tmp': Permission denied".to_string(),
        },
    );

    let err = deployer(&cluster)
        .exists(REMOTE, &target())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RemoteCommandFailed { exit_code: 0, .. }));
}
