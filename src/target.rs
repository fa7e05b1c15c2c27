//! Capture target resolution.
//!
//! Turns a target pod into the node, runtime and runtime-level container ID
//! the rest of the engine works with. Kubernetes reports container IDs as
//! `<runtime>://<id>`, e.g. `containerd://4f2a...` or `cri-o://9b1c...`.

use std::sync::OnceLock;

use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::runtime::RuntimeKind;

// =============================================================================
// Container Descriptor
// =============================================================================

/// Runtime-level identity of the container being sniffed.
///
/// `runtime` and `container_id` are fixed at construction. `detected_pid`
/// and `socket_path` are written at most once, during setup.
#[derive(Debug)]
pub struct ContainerDescriptor {
    runtime: RuntimeKind,
    container_id: String,
    detected_pid: OnceLock<String>,
    socket_path: OnceLock<String>,
}

impl ContainerDescriptor {
    pub fn new(runtime: RuntimeKind, container_id: impl Into<String>) -> Self {
        Self {
            runtime,
            container_id: container_id.into(),
            detected_pid: OnceLock::new(),
            socket_path: OnceLock::new(),
        }
    }

    /// Parses a pod status `containerID` (`<runtime>://<id>`).
    pub fn from_status_id(status_id: &str) -> Result<Self> {
        let (runtime, id) = status_id.split_once("://").ok_or_else(|| {
            Error::InvalidTarget(format!("malformed container ID '{status_id}'"))
        })?;
        if id.is_empty() {
            return Err(Error::InvalidTarget(format!(
                "container ID '{status_id}' has no runtime ID"
            )));
        }
        Ok(Self::new(runtime.parse()?, id))
    }

    pub fn runtime(&self) -> RuntimeKind {
        self.runtime
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn detected_pid(&self) -> Option<&str> {
        self.detected_pid.get().map(String::as_str)
    }

    pub fn socket_path(&self) -> Option<&str> {
        self.socket_path.get().map(String::as_str)
    }

    /// Records the target's host PID. Fails if already recorded.
    pub fn set_detected_pid(&self, pid: impl Into<String>) -> Result<()> {
        self.detected_pid
            .set(pid.into())
            .map_err(|_| Error::InvalidState {
                operation: "record container PID".to_string(),
                state: "PID already detected".to_string(),
            })
    }

    /// Records the runtime socket path. Fails if already recorded.
    pub fn set_socket_path(&self, path: impl Into<String>) -> Result<()> {
        self.socket_path
            .set(path.into())
            .map_err(|_| Error::InvalidState {
                operation: "record socket path".to_string(),
                state: "socket path already set".to_string(),
            })
    }
}

// =============================================================================
// Target Resolution
// =============================================================================

/// Everything known about the container to sniff.
#[derive(Debug)]
pub struct TargetContainer {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub node_name: String,
    pub descriptor: ContainerDescriptor,
}

/// Resolves `container` (or the pod's first container) of `pod`.
pub fn resolve_target(pod: &Pod, container: Option<&str>) -> Result<TargetContainer> {
    let pod_name = pod.metadata.name.clone().unwrap_or_default();
    let namespace = pod
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string());

    let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
    debug!("pod '{}' status: '{}'", pod_name, phase.unwrap_or("Unknown"));
    if matches!(phase, Some("Succeeded") | Some("Failed")) {
        return Err(Error::InvalidTarget(format!(
            "cannot sniff on a container in a completed pod; current phase is {}",
            phase.unwrap_or_default()
        )));
    }

    let spec = pod
        .spec
        .as_ref()
        .ok_or_else(|| Error::InvalidTarget(format!("pod '{pod_name}' has no spec")))?;

    let container_name = match container {
        Some(name) => {
            if !spec.containers.iter().any(|c| c.name == name) {
                return Err(Error::InvalidTarget(format!(
                    "container '{name}' not found in pod '{pod_name}'"
                )));
            }
            name.to_string()
        }
        None => {
            let first = spec.containers.first().ok_or_else(|| {
                Error::InvalidTarget(format!("no containers in pod '{pod_name}'"))
            })?;
            info!(
                "no container specified, taking first container we found in pod: '{}'",
                first.name
            );
            first.name.clone()
        }
    };

    let node_name = spec.node_name.clone().ok_or_else(|| {
        Error::InvalidTarget(format!("pod '{pod_name}' is not scheduled on a node"))
    })?;

    let status_id = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| statuses.iter().find(|cs| cs.name == container_name))
        .and_then(|cs| cs.container_id.as_deref())
        .ok_or_else(|| {
            Error::InvalidTarget(format!(
                "couldn't find container: '{container_name}' in pod: '{pod_name}'"
            ))
        })?;

    let descriptor = ContainerDescriptor::from_status_id(status_id)?;

    Ok(TargetContainer {
        namespace,
        pod: pod_name,
        container: container_name,
        node_name,
        descriptor,
    })
}
