//! Capture strategies.
//!
//! Every strategy follows the same three-step contract:
//!
//! ```text
//!   setup   establish preconditions (upload binary / helper pod / PID)
//!   start   run the long-lived capture, streaming pcap bytes to a sink
//!   cleanup remove whatever setup and start created
//! ```
//!
//! | Strategy                  | Runs capture in    | Leaves behind              |
//! |---------------------------|--------------------|----------------------------|
//! | [`StaticUploadSniffer`]   | target container   | uploaded binary            |
//! | [`PrivilegedSniffer`]     | helper pod         | helper pod, sibling        |
//! | [`NodeSniffer`]           | helper pod (host)  | helper pod                 |
//!
//! Ordering between the steps is enforced by
//! [`SnifferSession`](crate::session::SnifferSession).

mod node;
mod privileged;
mod upload;

pub use node::NodeSniffer;
pub use privileged::PrivilegedSniffer;
pub use upload::StaticUploadSniffer;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use crate::cluster::{ExecTarget, PodClient, RemoteExecutor};
use crate::config::{CaptureSpec, SniffMode, StaticBinarySpec};
use crate::error::{Error, Result};
use crate::helper::HelperPodManager;
use crate::naming::NameGenerator;
use crate::runtime::ContainerRuntimeBridge;
use crate::target::TargetContainer;
use crate::upload::{FileDeployer, UploadOutcome};

/// What a successful setup established.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupOutcome {
    /// Name of the helper pod created for the capture.
    pub helper_pod: Option<String>,
    /// Host PID of the target container, for PID-based runtimes.
    pub detected_pid: Option<String>,
    /// Result of the capture binary upload.
    pub upload: Option<UploadOutcome>,
}

/// Failures collected during cleanup. Never fatal.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub failures: Vec<Error>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn record(&mut self, error: Error) {
        tracing::warn!("cleanup step failed: {}", error);
        self.failures.push(error);
    }
}

/// A capture strategy.
#[async_trait]
pub trait Sniffer: Send {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Establishes preconditions. `cancel` aborts any waiting.
    async fn setup(&mut self, cancel: &CancellationToken) -> Result<SetupOutcome>;

    /// Runs the capture until the remote command exits.
    async fn start(&mut self, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()>;

    /// Removes created resources. Safe after partial setup and when repeated.
    async fn cleanup(&mut self) -> CleanupReport;
}

/// Cluster collaborators shared by every strategy.
#[derive(Clone)]
pub struct ClusterHandles {
    pub pods: Arc<dyn PodClient>,
    pub executor: Arc<dyn RemoteExecutor>,
    pub names: Arc<dyn NameGenerator>,
}

impl ClusterHandles {
    fn helper_manager(&self, namespace: &str) -> HelperPodManager {
        HelperPodManager::new(self.pods.clone(), self.names.clone(), namespace)
    }
}

impl std::fmt::Debug for ClusterHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterHandles")
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

/// Builds the strategy for `mode`.
///
/// `binary` is required for [`SniffMode::StaticUpload`] only.
pub fn build_sniffer(
    mode: SniffMode,
    target: TargetContainer,
    spec: &CaptureSpec,
    binary: Option<StaticBinarySpec>,
    cluster: &ClusterHandles,
) -> Result<Box<dyn Sniffer>> {
    match mode {
        SniffMode::StaticUpload => {
            let binary = binary.ok_or_else(|| {
                Error::Config("static upload mode needs a local capture binary".to_string())
            })?;
            let exec_target = ExecTarget::new(&target.namespace, &target.pod, &target.container);
            Ok(Box::new(StaticUploadSniffer::new(
                exec_target,
                binary,
                spec.clone(),
                FileDeployer::new(cluster.executor.clone()),
                cluster.executor.clone(),
            )))
        }
        SniffMode::Privileged => {
            let bridge = ContainerRuntimeBridge::new(target.descriptor.runtime());
            let capture = spec.resolve(&bridge);
            let helpers = cluster.helper_manager(&target.namespace);
            Ok(Box::new(PrivilegedSniffer::new(
                target,
                bridge,
                capture,
                helpers,
                cluster.executor.clone(),
                cluster.names.clone(),
            )))
        }
        SniffMode::Node => {
            let helpers = cluster.helper_manager(&target.namespace);
            Ok(Box::new(NodeSniffer::new(
                target.node_name,
                spec.resolve_for_node(),
                helpers,
                cluster.executor.clone(),
            )))
        }
    }
}
