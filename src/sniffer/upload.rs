//! Capture with a static binary uploaded into the target container.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{CleanupReport, SetupOutcome, Sniffer};
use crate::cluster::{ExecTarget, RemoteExecutor};
use crate::config::{CaptureSpec, StaticBinarySpec};
use crate::error::{Error, Result};
use crate::runtime::display_command;
use crate::upload::FileDeployer;

/// Runs an uploaded capture binary directly in the target container.
///
/// Needs no privileges beyond exec, but the target image must be able to
/// run a static Linux binary and have `tar` available.
pub struct StaticUploadSniffer {
    target: ExecTarget,
    binary: StaticBinarySpec,
    capture: CaptureSpec,
    deployer: FileDeployer,
    executor: Arc<dyn RemoteExecutor>,
    ready: bool,
}

impl StaticUploadSniffer {
    pub fn new(
        target: ExecTarget,
        binary: StaticBinarySpec,
        capture: CaptureSpec,
        deployer: FileDeployer,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Self {
        Self {
            target,
            binary,
            capture,
            deployer,
            executor,
            ready: false,
        }
    }

    /// `<remote binary> -i <interface> -U -w - <filter>`
    pub fn capture_command(&self) -> Vec<String> {
        vec![
            self.binary.remote_path.clone(),
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
impl Sniffer for StaticUploadSniffer {
    fn name(&self) -> &'static str {
        "static-upload"
    }

    async fn setup(&mut self, _cancel: &CancellationToken) -> Result<SetupOutcome> {
        info!(
            "uploading static capture binary '{}' to {}/{} container '{}' at '{}'",
            self.binary.local_path.display(),
            self.target.namespace,
            self.target.pod,
            self.target.container,
            self.binary.remote_path
        );

        let content = tokio::fs::read(&self.binary.local_path).await?;
        let outcome = self
            .deployer
            .ensure_present(&content, &self.binary.remote_path, &self.target)
            .await?;
        self.ready = true;

        Ok(SetupOutcome {
            upload: Some(outcome),
            ..SetupOutcome::default()
        })
    }

    async fn start(&mut self, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        if !self.ready {
            return Err(Error::InvalidState {
                operation: "start capture".to_string(),
                state: "capture binary not deployed".to_string(),
            });
        }

        let command = self.capture_command();
        info!("starting remote capture: '{}'", display_command(&command));
        let status = self.executor.exec(&self.target, &command, None, sink).await?;
        status.check(&command)?;
        Ok(())
    }

    async fn cleanup(&mut self) -> CleanupReport {
        debug!("static upload leaves no resources to clean up");
        CleanupReport::default()
    }
}
