//! Capture from a privileged helper pod on the target's node.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{CleanupReport, SetupOutcome, Sniffer};
use crate::cluster::{exec_buffered, RemoteExecutor};
use crate::config::ResolvedCapture;
use crate::constants::PRIVILEGED_CONTAINER_NAME;
use crate::error::{Error, Result};
use crate::helper::{HelperPodConfig, HelperPodHandle, HelperPodManager};
use crate::naming::NameGenerator;
use crate::runtime::{display_command, ContainerRuntimeBridge, SiblingContainer};
use crate::target::TargetContainer;

/// Runs the runtime bridge's commands inside a privileged helper pod.
pub struct PrivilegedSniffer {
    target: TargetContainer,
    bridge: ContainerRuntimeBridge,
    capture: ResolvedCapture,
    helpers: HelperPodManager,
    executor: Arc<dyn RemoteExecutor>,
    names: Arc<dyn NameGenerator>,
    helper: Option<HelperPodHandle>,
    sibling: Option<SiblingContainer>,
}

impl PrivilegedSniffer {
    pub fn new(
        target: TargetContainer,
        bridge: ContainerRuntimeBridge,
        capture: ResolvedCapture,
        helpers: HelperPodManager,
        executor: Arc<dyn RemoteExecutor>,
        names: Arc<dyn NameGenerator>,
    ) -> Self {
        Self {
            target,
            bridge,
            capture,
            helpers,
            executor,
            names,
            helper: None,
            sibling: None,
        }
    }

    /// The helper pod, while it exists.
    pub fn helper(&self) -> Option<&HelperPodHandle> {
        self.helper.as_ref()
    }

    pub fn target(&self) -> &TargetContainer {
        &self.target
    }

    fn helper_config(&self) -> HelperPodConfig {
        HelperPodConfig {
            node_name: self.target.node_name.clone(),
            container_name: PRIVILEGED_CONTAINER_NAME.to_string(),
            image: self.capture.helper_image.clone(),
            socket_path: Some(self.capture.socket_path.clone()),
            host_network: false,
        }
    }

    fn capture_command(&mut self) -> Result<Vec<String>> {
        let descriptor = &self.target.descriptor;
        match &self.bridge {
            ContainerRuntimeBridge::ByPid(bridge) => {
                let pid = descriptor.detected_pid().ok_or_else(|| Error::InvalidState {
                    operation: "start capture".to_string(),
                    state: "target PID not detected".to_string(),
                })?;
                Ok(bridge.build_capture_command(pid, &self.capture.interface, &self.capture.filter))
            }
            ContainerRuntimeBridge::BySocket(bridge) => {
                let socket = descriptor
                    .socket_path()
                    .unwrap_or(self.capture.socket_path.as_str());
                let sibling = SiblingContainer::generate(self.names.as_ref(), socket);
                let command = bridge.build_capture_command(
                    &sibling,
                    descriptor.container_id(),
                    &self.capture.interface,
                    &self.capture.filter,
                    &self.capture.capture_image,
                );
                self.sibling = Some(sibling);
                Ok(command)
            }
        }
    }

    fn bridge_cleanup_command(&mut self) -> Option<Vec<String>> {
        match &self.bridge {
            ContainerRuntimeBridge::ByPid(bridge) => bridge.build_cleanup_command(),
            ContainerRuntimeBridge::BySocket(bridge) => self
                .sibling
                .take()
                .and_then(|sibling| bridge.build_cleanup_command(&sibling)),
        }
    }
}

#[async_trait]
impl Sniffer for PrivilegedSniffer {
    fn name(&self) -> &'static str {
        "privileged"
    }

    async fn setup(&mut self, cancel: &CancellationToken) -> Result<SetupOutcome> {
        info!(
            "sniffing {}/{} container '{}' ({}://{}) via privileged helper",
            self.target.namespace,
            self.target.pod,
            self.target.container,
            self.target.descriptor.runtime(),
            self.target.descriptor.container_id()
        );

        if self.bridge.needs_socket() {
            self.target
                .descriptor
                .set_socket_path(self.capture.socket_path.clone())?;
        }

        let config = self.helper_config();
        // Stored before the create request so cleanup can delete it even if
        // setup is dropped mid-request.
        let handle = self.helper.insert(self.helpers.plan(&config));
        self.helpers.submit(handle, &config).await?;
        self.helpers
            .await_ready(handle, self.capture.pod_creation_timeout, cancel)
            .await?;
        let exec_target = handle.exec_target();
        let helper_pod = Some(handle.name.clone());

        let detected_pid = match &self.bridge {
            ContainerRuntimeBridge::ByPid(bridge) => {
                let command = bridge.build_inspect_command(self.target.descriptor.container_id());
                let output =
                    exec_buffered(self.executor.as_ref(), &exec_target, &command, None).await?;
                output.status.check(&command)?;

                let pid = bridge.extract_pid(&output.stdout_lossy())?;
                info!("found container PID: '{}'", pid);
                self.target.descriptor.set_detected_pid(pid.clone())?;
                Some(pid)
            }
            ContainerRuntimeBridge::BySocket(_) => None,
        };

        Ok(SetupOutcome {
            helper_pod,
            detected_pid,
            upload: None,
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

        let command = self.capture_command()?;
        info!("starting remote capture: '{}'", display_command(&command));

        let status = self.executor.exec(&exec_target, &command, None, sink).await?;
        status.check(&command)?;
        info!("remote capture finished");
        Ok(())
    }

    async fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let Some(helper) = self.helper.take() else {
            debug!("no helper pod to clean up");
            return report;
        };

        match self.bridge_cleanup_command() {
            Some(command) => {
                info!("removing capture container: '{}'", display_command(&command));
                let result = exec_buffered(
                    self.executor.as_ref(),
                    &helper.exec_target(),
                    &command,
                    None,
                )
                .await
                .and_then(|output| output.status.check(&command));
                if let Err(e) = result {
                    report.record(Error::CleanupFailed {
                        resource: "capture container".to_string(),
                        reason: e.to_string(),
                    });
                }
            }
            None => info!("no cleanup command needed"),
        }

        if let Err(e) = self.helpers.delete(&helper).await {
            report.record(e);
        }
        report
    }
}
