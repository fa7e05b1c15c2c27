//! Container runtime bridge - runtime-specific capture command building.
//!
//! A bridge translates "capture traffic of container X" into the exact argv
//! executed inside the helper pod. Runtimes attach in one of two ways:
//!
//! ```text
//!                      ContainerRuntimeBridge
//!                 ┌──────────────┴──────────────┐
//!              ByPid                         BySocket
//!        (join netns via PID)        (drive the runtime's socket)
//!                 │                     ┌───────┴────────┐
//!            CrioBridge            DockerBridge   ContainerdBridge
//!   inspect → extract_pid →        sibling container joined to the
//!   nsenter -n -t <pid> tcpdump    target's network namespace
//! ```
//!
//! The split is expressed in the type: only [`PidBridge`] has inspection and
//! PID extraction, so the orchestrator can never ask Docker for a PID.

use crate::constants::SIBLING_CONTAINER_PREFIX;
use crate::error::{Error, PidError, Result};
use crate::naming::NameGenerator;
use crate::runtimes::{ContainerdBridge, CrioBridge, DockerBridge};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Runtime Kind
// =============================================================================

/// Container runtimes with a bridge implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeKind {
    /// Docker engine (dockershim nodes).
    #[serde(rename = "docker")]
    Docker,
    /// CRI-O.
    #[serde(rename = "cri-o")]
    CriO,
    /// containerd.
    #[serde(rename = "containerd")]
    Containerd,
}

impl RuntimeKind {
    /// All supported runtimes.
    pub const ALL: [RuntimeKind; 3] = [Self::Docker, Self::CriO, Self::Containerd];

    /// Name as it appears in a pod's `containerID` (`<name>://<id>`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::CriO => "cri-o",
            Self::Containerd => "containerd",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnsupportedRuntime {
                runtime: s.to_string(),
            })
    }
}

// =============================================================================
// Bridge Traits
// =============================================================================

/// Defaults shared by every runtime bridge.
pub trait RuntimeBridge: Send + Sync + fmt::Debug {
    /// Runtime this bridge drives.
    fn kind(&self) -> RuntimeKind;

    /// Image of the privileged helper container.
    fn default_image(&self) -> &'static str;

    /// Image running the capture binary.
    fn default_capture_image(&self) -> &'static str;

    /// Runtime control socket on the node.
    fn default_socket_path(&self) -> &'static str;
}

/// Runtimes attached by entering the target's network namespace through
/// its PID.
pub trait PidBridge: RuntimeBridge {
    /// Command printing the runtime's inspection document for a container.
    fn build_inspect_command(&self, container_id: &str) -> Vec<String>;

    /// Reads the container's host PID from the inspection document.
    fn extract_pid(&self, inspection: &str) -> std::result::Result<String, PidError>;

    /// Capture command streaming pcap bytes to stdout.
    fn build_capture_command(&self, pid: &str, interface: &str, filter: &str) -> Vec<String>;

    /// Command undoing the capture, if it leaves anything behind.
    fn build_cleanup_command(&self) -> Option<Vec<String>> {
        None
    }
}

/// Runtimes attached by starting a sibling capture container through the
/// runtime's control socket.
pub trait SocketBridge: RuntimeBridge {
    /// Capture command starting `sibling` in the target's network namespace.
    fn build_capture_command(
        &self,
        sibling: &SiblingContainer,
        container_id: &str,
        interface: &str,
        filter: &str,
        capture_image: &str,
    ) -> Vec<String>;

    /// Command removing `sibling`.
    fn build_cleanup_command(&self, sibling: &SiblingContainer) -> Option<Vec<String>>;
}

/// Sibling capture container created by a [`SocketBridge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingContainer {
    /// Generated unique container name.
    pub name: String,
    /// Runtime socket the container was created through.
    pub socket_path: String,
}

impl SiblingContainer {
    /// Allocates a fresh sibling name.
    pub fn generate(names: &dyn NameGenerator, socket_path: impl Into<String>) -> Self {
        Self {
            name: names.unique_name(SIBLING_CONTAINER_PREFIX),
            socket_path: socket_path.into(),
        }
    }
}

// =============================================================================
// Bridge Selection
// =============================================================================

/// A runtime bridge tagged with its attachment capability.
#[derive(Debug)]
pub enum ContainerRuntimeBridge {
    /// Attaches via the container's PID.
    ByPid(Box<dyn PidBridge>),
    /// Attaches via the runtime socket.
    BySocket(Box<dyn SocketBridge>),
}

impl ContainerRuntimeBridge {
    /// Creates the bridge for `kind`.
    pub fn new(kind: RuntimeKind) -> Self {
        match kind {
            RuntimeKind::Docker => Self::BySocket(Box::new(DockerBridge::new())),
            RuntimeKind::CriO => Self::ByPid(Box::new(CrioBridge::new())),
            RuntimeKind::Containerd => Self::BySocket(Box::new(ContainerdBridge::new())),
        }
    }

    /// Creates the bridge for a runtime name, failing on unknown runtimes.
    pub fn for_runtime(name: &str) -> Result<Self> {
        Ok(Self::new(name.parse()?))
    }

    /// True if the target PID must be resolved during setup.
    pub fn needs_pid(&self) -> bool {
        matches!(self, Self::ByPid(_))
    }

    /// True if the runtime socket must be mounted into the helper.
    pub fn needs_socket(&self) -> bool {
        matches!(self, Self::BySocket(_))
    }

    /// Runtime the wrapped bridge drives.
    pub fn kind(&self) -> RuntimeKind {
        match self {
            Self::ByPid(b) => b.kind(),
            Self::BySocket(b) => b.kind(),
        }
    }

    /// Helper pod image used when no override is given.
    pub fn default_image(&self) -> &'static str {
        match self {
            Self::ByPid(b) => b.default_image(),
            Self::BySocket(b) => b.default_image(),
        }
    }

    /// Image of the sibling capture container for socket runtimes.
    pub fn default_capture_image(&self) -> &'static str {
        match self {
            Self::ByPid(b) => b.default_capture_image(),
            Self::BySocket(b) => b.default_capture_image(),
        }
    }

    /// Runtime socket path on the node.
    pub fn default_socket_path(&self) -> &'static str {
        match self {
            Self::ByPid(b) => b.default_socket_path(),
            Self::BySocket(b) => b.default_socket_path(),
        }
    }
}

/// Joins argv for log and error messages.
pub fn display_command(command: &[String]) -> String {
    command.join(" ")
}
