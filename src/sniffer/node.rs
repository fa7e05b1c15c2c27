//! Node-wide capture from a helper pod sharing the host network.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{CleanupReport, SetupOutcome, Sniffer};
use crate::cluster::RemoteExecutor;
use crate::config::ResolvedCapture;
use crate::constants::{CAPTURE_BINARY, NODE_CONTAINER_NAME};
use crate::error::{Error, Result};
use crate::helper::{HelperPodConfig, HelperPodHandle, HelperPodManager};
use crate::runtime::display_command;

/// Captures on the node's interfaces rather than a container's.
pub struct NodeSniffer {
    node_name: String,
    capture: ResolvedCapture,
    helpers: HelperPodManager,
    executor: Arc<dyn RemoteExecutor>,
    helper: Option<HelperPodHandle>,
}

impl NodeSniffer {
    pub fn new(
        node_name: impl Into<String>,
        capture: ResolvedCapture,
        helpers: HelperPodManager,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            capture,
            helpers,
            executor,
            helper: None,
        }
    }

    pub fn helper(&self) -> Option<&HelperPodHandle> {
        self.helper.as_ref()
    }

    /// `tcpdump -i <interface> -U -w - <filter>`
    pub fn capture_command(&self) -> Vec<String> {
        vec![
            CAPTURE_BINARY.to_string(),
            "-i".to_string(),
            self.capture.interface.clone(),
            "-U".to_string(),
            "-w".to_string(),
            "-".to_string(),
            self.capture.filter.clone(),
        ]
    }
}

#[async_trait]
impl Sniffer for NodeSniffer {
    fn name(&self) -> &'static str {
        "node"
    }

    async fn setup(&mut self, cancel: &CancellationToken) -> Result<SetupOutcome> {
        info!("sniffing node '{}' on interface '{}'", self.node_name, self.capture.interface);

        let config = HelperPodConfig {
            node_name: self.node_name.clone(),
            container_name: NODE_CONTAINER_NAME.to_string(),
            image: self.capture.helper_image.clone(),
            socket_path: None,
            host_network: true,
        };
        let handle = self.helper.insert(self.helpers.plan(&config));
        self.helpers.submit(handle, &config).await?;
        self.helpers
            .await_ready(handle, self.capture.pod_creation_timeout, cancel)
            .await?;

        Ok(SetupOutcome {
            helper_pod: Some(handle.name.clone()),
            ..SetupOutcome::default()
        })
    }

    async fn start(&mut self, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        let exec_target = self
            .helper
            .as_ref()
            .map(HelperPodHandle::exec_target)
            .ok_or_else(|| Error::InvalidState {
                operation: "start capture".to_string(),
                state: "helper pod not created".to_string(),
            })?;

        let command = self.capture_command();
        info!("starting node capture: '{}'", display_command(&command));
        let status = self.executor.exec(&exec_target, &command, None, sink).await?;
        status.check(&command)?;
        Ok(())
    }

    async fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        match self.helper.take() {
            Some(helper) => {
                if let Err(e) = self.helpers.delete(&helper).await {
                    report.record(e);
                }
            }
            None => debug!("no helper pod to clean up"),
        }
        report
    }
}
