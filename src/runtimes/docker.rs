//! Docker bridge.
//!
//! Starts a sibling container through the node's Docker socket that shares
//! the target's network namespace (`--net=container:<id>`) and writes pcap
//! data to its own stdout.

use crate::constants::{DEFAULT_CAPTURE_IMAGE, DOCKER_HELPER_IMAGE, DOCKER_SOCKET_PATH};
use crate::runtime::{RuntimeBridge, RuntimeKind, SiblingContainer, SocketBridge};

/// Bridge for Docker nodes.
#[derive(Debug, Default, Clone)]
pub struct DockerBridge;

impl DockerBridge {
    pub fn new() -> Self {
        Self
    }
}

fn docker_host(socket_path: &str) -> String {
    format!("unix://{socket_path}")
}

impl RuntimeBridge for DockerBridge {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Docker
    }

    fn default_image(&self) -> &'static str {
        DOCKER_HELPER_IMAGE
    }

    fn default_capture_image(&self) -> &'static str {
        DEFAULT_CAPTURE_IMAGE
    }

    fn default_socket_path(&self) -> &'static str {
        DOCKER_SOCKET_PATH
    }
}

impl SocketBridge for DockerBridge {
    fn build_capture_command(
        &self,
        sibling: &SiblingContainer,
        container_id: &str,
        interface: &str,
        filter: &str,
        capture_image: &str,
    ) -> Vec<String> {
        vec![
            "docker".to_string(),
            "--host".to_string(),
            docker_host(&sibling.socket_path),
            "run".to_string(),
            "--rm".to_string(),
            "--log-driver".to_string(),
            "none".to_string(),
            "--name".to_string(),
            sibling.name.clone(),
            format!("--net=container:{container_id}"),
            capture_image.to_string(),
            "-i".to_string(),
            interface.to_string(),
            "-U".to_string(),
            "-w".to_string(),
            "-".to_string(),
            filter.to_string(),
        ]
    }

    fn build_cleanup_command(&self, sibling: &SiblingContainer) -> Option<Vec<String>> {
        Some(vec![
            "docker".to_string(),
            "--host".to_string(),
            docker_host(&sibling.socket_path),
            "rm".to_string(),
            "-f".to_string(),
            sibling.name.clone(),
        ])
    }
}
