//! Kubernetes API implementation of the cluster seams.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams, DeleteParams, PostParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::{DeleteOutcome, ExecStatus, ExecTarget, PodClient, RemoteExecutor};
use crate::error::{Error, Result};
use crate::runtime::display_command;

/// Pod CRUD and exec against a live API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects using the local kubeconfig, optionally selecting `context`.
    ///
    /// Returns the client and the context's default namespace.
    pub async fn connect(context: Option<&str>) -> Result<(Self, String)> {
        let options = KubeConfigOptions {
            context: context.map(str::to_string),
            ..KubeConfigOptions::default()
        };
        let config = Config::from_kubeconfig(&options)
            .await
            .map_err(|e| Error::Config(format!("failed to load kubeconfig: {e}")))?;
        let namespace = config.default_namespace.clone();
        let client = Client::try_from(config).map_err(|e| cluster_error("connect", e))?;

        debug!("connected to cluster, default namespace '{}'", namespace);
        Ok((Self::new(client), namespace))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

fn cluster_error(operation: &str, e: kube::Error) -> Error {
    Error::Cluster {
        operation: operation.to_string(),
        reason: e.to_string(),
    }
}

fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(response) if response.code == 404)
}

#[async_trait]
impl PodClient for KubeCluster {
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod> {
        self.pods(namespace)
            .create(&PostParams::default(), pod)
            .await
            .map_err(|e| cluster_error("create pod", e))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.pods(namespace).get(name).await.map_err(|e| {
            if is_not_found(&e) {
                Error::InvalidTarget(format!("pod '{name}' not found in namespace '{namespace}'"))
            } else {
                cluster_error("get pod", e)
            }
        })
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_secs: u32,
    ) -> Result<DeleteOutcome> {
        let params = DeleteParams {
            grace_period_seconds: Some(grace_period_secs),
            ..DeleteParams::default()
        };
        match self.pods(namespace).delete(name, &params).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(e) if is_not_found(&e) => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(cluster_error("delete pod", e)),
        }
    }
}

#[async_trait]
impl RemoteExecutor for KubeCluster {
    async fn exec(
        &self,
        target: &ExecTarget,
        command: &[String],
        stdin: Option<Vec<u8>>,
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<ExecStatus> {
        let shown = display_command(command);
        let exec_error = |reason: String| Error::Exec {
            command: shown.clone(),
            reason,
        };

        let params = AttachParams::default()
            .container(target.container.clone())
            .stdin(stdin.is_some())
            .stdout(true)
            .stderr(true);

        debug!(
            "executing '{}' in {}/{} container '{}'",
            shown, target.namespace, target.pod, target.container
        );
        let mut attached = self
            .pods(&target.namespace)
            .exec(&target.pod, command.to_vec(), &params)
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        let remote_stdin = attached.stdin();
        let mut remote_stdout = attached
            .stdout()
            .ok_or_else(|| exec_error("stdout not attached".to_string()))?;
        let remote_stderr = attached.stderr();
        let status = attached.take_status();

        let feed = async move {
            if let (Some(mut writer), Some(data)) = (remote_stdin, stdin) {
                writer.write_all(&data).await?;
                writer.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let drain = async {
            tokio::io::copy(&mut remote_stdout, stdout).await?;
            stdout.flush().await
        };
        let collect = async move {
            let mut buf = String::new();
            if let Some(mut reader) = remote_stderr {
                reader.read_to_string(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };

        let (_, _, stderr) =
            tokio::try_join!(feed, drain, collect).map_err(|e| exec_error(e.to_string()))?;

        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        let exit_code = exit_code_from_status(status.as_ref())
            .ok_or_else(|| exec_error("stream closed without an exit status".to_string()))?;

        Ok(ExecStatus { exit_code, stderr })
    }
}

/// Reads the exit code from the status frame sent at the end of an exec.
fn exit_code_from_status(status: Option<&Status>) -> Option<i32> {
    let status = status?;
    if status.status.as_deref() == Some("Success") {
        return Some(0);
    }
    if status.reason.as_deref() != Some("NonZeroExitCode") {
        return None;
    }
    status
        .details
        .as_ref()?
        .causes
        .as_ref()?
        .iter()
        .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
        .and_then(|cause| cause.message.as_deref())
        .and_then(|message| message.trim().parse().ok())
}
