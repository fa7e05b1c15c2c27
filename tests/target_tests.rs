//! Tests for capture target resolution.

mod common;

use common::target_pod;
use kubesniff::{resolve_target, Error, RuntimeKind};

#[test]
fn test_defaults_to_first_container() {
    let target = resolve_target(&target_pod("docker://abc123"), None).unwrap();

    assert_eq!(target.namespace, "shop");
    assert_eq!(target.pod, "web-0");
    assert_eq!(target.container, "app");
    assert_eq!(target.node_name, "node-a");
    assert_eq!(target.descriptor.runtime(), RuntimeKind::Docker);
    assert_eq!(target.descriptor.container_id(), "abc123");
}

#[test]
fn test_runtime_comes_from_chosen_container() {
    let target = resolve_target(&target_pod("docker://abc123"), Some("sidecar")).unwrap();

    assert_eq!(target.container, "sidecar");
    assert_eq!(target.descriptor.runtime(), RuntimeKind::Containerd);
    assert_eq!(target.descriptor.container_id(), "5ideca5");
}

#[test]
fn test_unknown_container_is_rejected() {
    let err = resolve_target(&target_pod("docker://abc123"), Some("db")).unwrap_err();

    assert!(matches!(err, Error::InvalidTarget(_)));
    assert!(err.to_string().contains("'db'"));
}

#[test]
fn test_completed_pod_is_rejected() {
    for phase in ["Succeeded", "Failed"] {
        let mut pod = target_pod("docker://abc123");
        pod.status.as_mut().unwrap().phase = Some(phase.to_string());

        let err = resolve_target(&pod, None).unwrap_err();
        assert!(err.to_string().contains(phase), "phase {phase}");
    }
}

#[test]
fn test_unscheduled_pod_is_rejected() {
    let mut pod = target_pod("docker://abc123");
    pod.spec.as_mut().unwrap().node_name = None;

    assert!(matches!(resolve_target(&pod, None), Err(Error::InvalidTarget(_))));
}

#[test]
fn test_container_without_status_is_rejected() {
    let mut pod = target_pod("docker://abc123");
    pod.status.as_mut().unwrap().container_statuses = None;

    let err = resolve_target(&pod, None).unwrap_err();
    assert!(err.to_string().contains("couldn't find container"));
}

#[test]
fn test_unsupported_runtime_is_rejected() {
    let err = resolve_target(&target_pod("rkt://abc123"), None).unwrap_err();
    assert!(matches!(err, Error::UnsupportedRuntime { ref runtime } if runtime == "rkt"));
}
