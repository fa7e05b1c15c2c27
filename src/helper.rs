//! Privileged helper pod lifecycle.
//!
//! A helper pod is pinned to the target's node and gets the host's PID
//! namespace, a privileged container, the node's root filesystem at
//! `/host`, and optionally the runtime socket. It idles on a long sleep;
//! all real work is executed into it.
//!
//! ```text
//!   create ──▶ Pending ──poll──▶ Running ──(exec...)──▶ delete
//!                 │                                       ▲
//!                 └──── timeout / interrupt ──────────────┘
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use k8s_openapi::api::core::v1::{
    Container, HostPathVolumeSource, Pod, PodSpec, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::{DeleteOutcome, ExecTarget, PodClient};
use crate::constants::{
    HELPER_APP_LABEL, HELPER_DELETE_GRACE_SECS, HELPER_ENTRYPOINT, HELPER_POD_PREFIX,
    HOST_ROOT_MOUNT, POD_POLL_INTERVAL,
};
use crate::error::{Error, Result};
use crate::naming::NameGenerator;
use crate::wait::run_while_false;

const HOST_ROOT_VOLUME: &str = "host";
const SOCKET_VOLUME: &str = "container-socket";

// =============================================================================
// Pod Phase
// =============================================================================

/// Pod lifecycle phase as reported by the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Reads the phase from a pod's status; absent status counts as Pending.
    pub fn of(pod: &Pod) -> Self {
        match pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
            None | Some("Pending") => Self::Pending,
            Some("Running") => Self::Running,
            Some("Succeeded") => Self::Succeeded,
            Some("Failed") => Self::Failed,
            Some(_) => Self::Unknown,
        }
    }

    /// Succeeded and Failed pods never run again under `restartPolicy: Never`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Helper Pod
// =============================================================================

/// Shape of a helper pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperPodConfig {
    /// Node the helper is pinned to.
    pub node_name: String,
    /// Name of the single privileged container.
    pub container_name: String,
    pub image: String,
    /// Runtime socket mounted read-only at the same path, if any.
    pub socket_path: Option<String>,
    /// Share the node's network namespace.
    pub host_network: bool,
}

/// A created helper pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperPodHandle {
    pub name: String,
    pub namespace: String,
    pub node_name: String,
    pub container_name: String,
    /// Last observed phase.
    pub phase: PodPhase,
}

impl HelperPodHandle {
    /// Where to exec commands in the helper.
    pub fn exec_target(&self) -> ExecTarget {
        ExecTarget::new(&self.namespace, &self.name, &self.container_name)
    }
}

/// Creates, awaits and deletes helper pods.
pub struct HelperPodManager {
    pods: Arc<dyn PodClient>,
    names: Arc<dyn NameGenerator>,
    namespace: String,
    poll_interval: Duration,
}

impl HelperPodManager {
    pub fn new(
        pods: Arc<dyn PodClient>,
        names: Arc<dyn NameGenerator>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            pods,
            names,
            namespace: namespace.into(),
            poll_interval: POD_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Builds the pod manifest for `config` under `name`.
    pub fn build_pod(&self, name: &str, config: &HelperPodConfig) -> Pod {
        let (label_key, label_value) = HELPER_APP_LABEL;

        let mut volumes = vec![Volume {
            name: HOST_ROOT_VOLUME.to_string(),
            host_path: Some(HostPathVolumeSource {
                path: "/".to_string(),
                type_: None,
            }),
            ..Volume::default()
        }];
        let mut mounts = vec![VolumeMount {
            name: HOST_ROOT_VOLUME.to_string(),
            mount_path: HOST_ROOT_MOUNT.to_string(),
            ..VolumeMount::default()
        }];

        if let Some(socket) = &config.socket_path {
            volumes.push(Volume {
                name: SOCKET_VOLUME.to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: socket.clone(),
                    type_: Some("Socket".to_string()),
                }),
                ..Volume::default()
            });
            mounts.push(VolumeMount {
                name: SOCKET_VOLUME.to_string(),
                mount_path: socket.clone(),
                read_only: Some(true),
                ..VolumeMount::default()
            });
        }

        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    label_key.to_string(),
                    label_value.to_string(),
                )])),
                ..ObjectMeta::default()
            },
            spec: Some(PodSpec {
                node_name: Some(config.node_name.clone()),
                restart_policy: Some("Never".to_string()),
                host_pid: Some(true),
                host_network: config.host_network.then_some(true),
                containers: vec![Container {
                    name: config.container_name.clone(),
                    image: Some(config.image.clone()),
                    image_pull_policy: Some("IfNotPresent".to_string()),
                    command: Some(HELPER_ENTRYPOINT.iter().map(|s| s.to_string()).collect()),
                    security_context: Some(SecurityContext {
                        privileged: Some(true),
                        ..SecurityContext::default()
                    }),
                    volume_mounts: Some(mounts),
                    ..Container::default()
                }],
                volumes: Some(volumes),
                ..PodSpec::default()
            }),
            ..Pod::default()
        }
    }

    /// Allocates a name for a helper described by `config` without creating
    /// anything. The handle stays Pending until [`submit`](Self::submit).
    pub fn plan(&self, config: &HelperPodConfig) -> HelperPodHandle {
        HelperPodHandle {
            name: self.names.unique_name(HELPER_POD_PREFIX),
            namespace: self.namespace.clone(),
            node_name: config.node_name.clone(),
            container_name: config.container_name.clone(),
            phase: PodPhase::Pending,
        }
    }

    /// Creates the pod planned as `handle`.
    ///
    /// Callers that may be interrupted keep `handle` before calling this, so
    /// a request that reached the API server can still be deleted.
    pub async fn submit(&self, handle: &mut HelperPodHandle, config: &HelperPodConfig) -> Result<()> {
        let manifest = self.build_pod(&handle.name, config);

        info!(
            "creating helper pod '{}' on node '{}' (image '{}')",
            handle.name, config.node_name, config.image
        );
        let created = self.pods.create_pod(&self.namespace, &manifest).await?;
        handle.phase = PodPhase::of(&created);
        Ok(())
    }

    /// Plans and creates a helper pod in one step.
    pub async fn create(&self, config: &HelperPodConfig) -> Result<HelperPodHandle> {
        let mut handle = self.plan(config);
        self.submit(&mut handle, config).await?;
        Ok(handle)
    }

    /// Polls until the helper is Running.
    ///
    /// A zero `timeout` waits until the pod runs or `cancel` fires. A pod
    /// that has already terminated can never run and fails immediately.
    pub async fn await_ready(
        &self,
        handle: &mut HelperPodHandle,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!("waiting for helper pod '{}' to be running", handle.name);

        let pods = &self.pods;
        let namespace = handle.namespace.as_str();
        let name = handle.name.as_str();
        let last_phase = Mutex::new(handle.phase);
        let observed = &last_phase;
        let settled = run_while_false(
            move || async move {
                match pods.get_pod(namespace, name).await {
                    Ok(pod) => {
                        let phase = PodPhase::of(&pod);
                        debug!("helper pod '{}' phase: {}", name, phase);
                        if let Ok(mut last) = observed.lock() {
                            *last = phase;
                        }
                        phase == PodPhase::Running || phase.is_terminal()
                    }
                    Err(e) => {
                        warn!("failed to get helper pod '{}': {}", name, e);
                        false
                    }
                }
            },
            timeout,
            self.poll_interval,
            cancel,
        )
        .await;

        if let Ok(phase) = last_phase.into_inner() {
            handle.phase = phase;
        }
        if settled && handle.phase == PodPhase::Running {
            info!("helper pod '{}' is running", handle.name);
            return Ok(());
        }
        if settled {
            return Err(Error::HelperTerminated {
                pod: handle.name.clone(),
                node: handle.node_name.clone(),
                phase: handle.phase.to_string(),
            });
        }
        if cancel.is_cancelled() {
            return Err(Error::Interrupted {
                stage: format!("startup of helper pod '{}'", handle.name),
            });
        }
        Err(Error::HelperCreationTimeout {
            pod: handle.name.clone(),
            node: handle.node_name.clone(),
            timeout,
        })
    }

    /// Deletes the helper. A pod that is already gone counts as deleted.
    pub async fn delete(&self, handle: &HelperPodHandle) -> Result<()> {
        info!("removing helper pod '{}'", handle.name);
        match self
            .pods
            .delete_pod(&handle.namespace, &handle.name, HELPER_DELETE_GRACE_SECS)
            .await
        {
            Ok(DeleteOutcome::Deleted) => {
                info!("helper pod '{}' removed", handle.name);
                Ok(())
            }
            Ok(DeleteOutcome::NotFound) => {
                info!("helper pod '{}' already gone", handle.name);
                Ok(())
            }
            Err(e) => Err(Error::CleanupFailed {
                resource: format!("helper pod {}/{}", handle.namespace, handle.name),
                reason: e.to_string(),
            }),
        }
    }
}

impl fmt::Debug for HelperPodManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelperPodManager")
            .field("names", &self.names)
            .field("namespace", &self.namespace)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
