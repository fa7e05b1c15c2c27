//! Cluster access seams.
//!
//! The engine touches the cluster in exactly two ways: pod CRUD and command
//! execution inside a container. Both are traits so the lifecycle code can
//! be driven against a real API server ([`KubeCluster`]) or a scripted fake.

mod kubernetes;

pub use self::kubernetes::KubeCluster;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use tokio::io::AsyncWrite;

use crate::error::{Error, Result};
use crate::runtime::display_command;

// =============================================================================
// Pod CRUD
// =============================================================================

/// Outcome of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Pod was deleted (or deletion started).
    Deleted,
    /// Pod did not exist.
    NotFound,
}

/// Pod operations used by the helper lifecycle.
#[async_trait]
pub trait PodClient: Send + Sync {
    /// Creates `pod` in `namespace`, returning the server's view of it.
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod>;

    /// Fetches a pod by name.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// Deletes a pod with the given grace period in seconds.
    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_secs: u32,
    ) -> Result<DeleteOutcome>;
}

// =============================================================================
// Remote Execution
// =============================================================================

/// Container a command is executed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTarget {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl ExecTarget {
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
        }
    }
}

/// How a remote command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecStatus {
    pub exit_code: i32,
    pub stderr: String,
}

impl ExecStatus {
    pub fn success() -> Self {
        Self {
            exit_code: 0,
            stderr: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turns a non-zero exit into [`Error::RemoteCommandFailed`].
    pub fn check(&self, command: &[String]) -> Result<()> {
        if self.is_success() {
            return Ok(());
        }
        Err(Error::RemoteCommandFailed {
            command: display_command(command),
            exit_code: self.exit_code,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Runs commands inside containers.
///
/// Stdout is streamed into `stdout` as it arrives. Stderr is collected and
/// returned in the [`ExecStatus`]. A remote non-zero exit is reported through
/// the status, not as an `Err`; `Err` means the command could not be run.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn exec(
        &self,
        target: &ExecTarget,
        command: &[String],
        stdin: Option<Vec<u8>>,
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<ExecStatus>;
}

/// Output of a command run with [`exec_buffered`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedOutput {
    pub status: ExecStatus,
    pub stdout: Vec<u8>,
}

impl BufferedOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Runs a short command and collects its stdout in memory.
pub async fn exec_buffered(
    executor: &dyn RemoteExecutor,
    target: &ExecTarget,
    command: &[String],
    stdin: Option<Vec<u8>>,
) -> Result<BufferedOutput> {
    let mut stdout = Vec::new();
    let status = executor.exec(target, command, stdin, &mut stdout).await?;
    Ok(BufferedOutput { status, stdout })
}
