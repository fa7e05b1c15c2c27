//! # Sniffing Constants
//!
//! Default images, socket paths, names, and timing used across the crate.
//! These are the single source of truth for values that must match existing
//! runtime tooling on cluster nodes.

use std::time::Duration;

// =============================================================================
// Capture Defaults
// =============================================================================

/// Interface captured when the caller does not choose one.
pub const DEFAULT_INTERFACE: &str = "any";

/// Capture binary invoked inside helper containers.
pub const CAPTURE_BINARY: &str = "tcpdump";

/// File name of the static capture binary looked up locally.
pub const STATIC_BINARY_NAME: &str = "static-tcpdump";

/// Where the static capture binary is placed in the target container.
pub const DEFAULT_REMOTE_BINARY_PATH: &str = "/tmp/static-tcpdump";

/// Generic capture image, also the node-wide helper image.
pub const DEFAULT_CAPTURE_IMAGE: &str = "maintained/tcpdump";

// =============================================================================
// Runtime Defaults
// =============================================================================

/// Docker helper image (ships the docker CLI).
pub const DOCKER_HELPER_IMAGE: &str = "docker";

/// Docker control socket on the node.
pub const DOCKER_SOCKET_PATH: &str = "/var/run/docker.sock";

/// CRI-O control socket on the node.
pub const CRIO_SOCKET_PATH: &str = "/var/run/crio/crio.sock";

/// Containerd helper image (ships crictl, ctr and jq).
pub const CONTAINERD_HELPER_IMAGE: &str = "docker.io/hamravesh/ksniff-helper:v3";

/// Containerd capture image, pulled through the node's containerd.
pub const CONTAINERD_CAPTURE_IMAGE: &str = "docker.io/maintained/tcpdump:latest";

/// Containerd control socket on the node.
pub const CONTAINERD_SOCKET_PATH: &str = "/run/containerd/containerd.sock";

/// Containerd namespace used by the kubelet.
pub const CONTAINERD_K8S_NAMESPACE: &str = "k8s.io";

// =============================================================================
// Helper Pod
// =============================================================================

/// Prefix for generated helper pod names.
pub const HELPER_POD_PREFIX: &str = "ksniff-";

/// Prefix for generated sibling capture container names.
pub const SIBLING_CONTAINER_PREFIX: &str = "ksniff-container-";

/// Label applied to every helper pod.
pub const HELPER_APP_LABEL: (&str, &str) = ("app", "ksniff");

/// Container name in the per-container helper pod.
pub const PRIVILEGED_CONTAINER_NAME: &str = "ksniff-privileged";

/// Container name in the node-wide helper pod.
pub const NODE_CONTAINER_NAME: &str = "node-sniff";

/// Mount point of the node's root filesystem inside the helper.
pub const HOST_ROOT_MOUNT: &str = "/host";

/// Keeps the helper alive; real work arrives through exec.
pub const HELPER_ENTRYPOINT: [&str; 3] = ["sh", "-c", "sleep 10000000"];

/// Default wait for the helper pod to reach Running.
pub const DEFAULT_POD_CREATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Helper pod status polling interval.
pub const POD_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Grace period for helper deletion (immediate termination).
pub const HELPER_DELETE_GRACE_SECS: u32 = 0;

// =============================================================================
// Upload
// =============================================================================

/// Mode of uploaded binaries.
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Largest binary accepted for upload (256 MiB).
pub const MAX_UPLOAD_SIZE: usize = 256 * 1024 * 1024;
