//! containerd bridge.
//!
//! containerd has no `--net=container:` shortcut, so the capture runs as a
//! shell script inside the helper:
//!
//! 1. export the socket/namespace variables `crictl` and `ctr` read
//! 2. pull the capture image through the node's containerd
//! 3. look up the target's network namespace path with `crictl inspect`
//! 4. `ctr run` the capture image inside that namespace under a generated name
//!
//! Cleanup kills the generated task through the same socket.

use crate::constants::{
    CAPTURE_BINARY, CONTAINERD_CAPTURE_IMAGE, CONTAINERD_HELPER_IMAGE, CONTAINERD_K8S_NAMESPACE,
    CONTAINERD_SOCKET_PATH, HOST_ROOT_MOUNT,
};
use crate::runtime::{RuntimeBridge, RuntimeKind, SiblingContainer, SocketBridge};

/// Bridge for containerd nodes.
#[derive(Debug, Default, Clone)]
pub struct ContainerdBridge;

impl ContainerdBridge {
    pub fn new() -> Self {
        Self
    }
}

/// Quotes `value` for POSIX sh.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn script_command(script: String) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), script]
}

fn env_preamble(socket_path: &str) -> String {
    format!(
        r#"
    set -ex
    export CONTAINERD_SOCKET={socket}
    export CONTAINERD_NAMESPACE="{namespace}"
    export CONTAINER_RUNTIME_ENDPOINT="unix://{host}${{CONTAINERD_SOCKET}}"
    export IMAGE_SERVICE_ENDPOINT=${{CONTAINER_RUNTIME_ENDPOINT}}"#,
        socket = shell_quote(socket_path),
        namespace = CONTAINERD_K8S_NAMESPACE,
        host = HOST_ROOT_MOUNT,
    )
}

impl RuntimeBridge for ContainerdBridge {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Containerd
    }

    fn default_image(&self) -> &'static str {
        CONTAINERD_HELPER_IMAGE
    }

    fn default_capture_image(&self) -> &'static str {
        CONTAINERD_CAPTURE_IMAGE
    }

    fn default_socket_path(&self) -> &'static str {
        CONTAINERD_SOCKET_PATH
    }
}

impl SocketBridge for ContainerdBridge {
    fn build_capture_command(
        &self,
        sibling: &SiblingContainer,
        container_id: &str,
        interface: &str,
        filter: &str,
        capture_image: &str,
    ) -> Vec<String> {
        let capture = format!(
            "{CAPTURE_BINARY} -i {} -U -w - {}",
            shell_quote(interface),
            shell_quote(filter)
        );
        let script = format!(
            r#"{preamble}
    crictl pull {image} >/dev/null
    netns=$(crictl inspect {id} | jq '.info.runtimeSpec.linux.namespaces[] | select(.type == "network") | .path' | tr -d '"')
    exec chroot {host} ctr -a ${{CONTAINERD_SOCKET}} run --rm --with-ns "network:${{netns}}" {image} {name} {capture}
    "#,
            preamble = env_preamble(&sibling.socket_path),
            image = shell_quote(capture_image),
            id = shell_quote(container_id),
            host = HOST_ROOT_MOUNT,
            name = shell_quote(&sibling.name),
            capture = capture,
        );
        script_command(script)
    }

    fn build_cleanup_command(&self, sibling: &SiblingContainer) -> Option<Vec<String>> {
        let script = format!(
            r#"{preamble}
    export CONTAINER_ID={name}
    chroot {host} ctr -a ${{CONTAINERD_SOCKET}} task kill -s SIGKILL ${{CONTAINER_ID}}
    "#,
            preamble = env_preamble(&sibling.socket_path),
            name = shell_quote(&sibling.name),
            host = HOST_ROOT_MOUNT,
        );
        Some(script_command(script))
    }
}
