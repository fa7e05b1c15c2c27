//! Scripted in-memory cluster shared by the integration tests.
//!
//! `FakeCluster` implements both cluster seams. Pods become Running after a
//! configurable number of status polls, `ls -alt` and `tar -xf -` operate on
//! an in-memory file set, and any command may be answered from a scripted
//! response table instead (first substring match wins; unscripted commands
//! exit 0 with no output).

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, ContainerStatus, Pod, PodSpec, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kubesniff::{
    ClusterHandles, DeleteOutcome, Error, ExecStatus, ExecTarget, PodClient,
    RemoteExecutor, Result, SequentialSuffix,
};
use kubesniff::runtime::display_command;
use tokio::io::{AsyncWrite, AsyncWriteExt};

// =============================================================================
// Recorded Calls
// =============================================================================

#[derive(Debug, Clone)]
pub struct ExecCall {
    pub target: ExecTarget,
    pub command: Vec<String>,
    pub stdin: Option<Vec<u8>>,
}

impl ExecCall {
    pub fn joined(&self) -> String {
        display_command(&self.command)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecResponse {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ExecResponse {
    pub fn stdout(data: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: data.into(),
            ..Self::default()
        }
    }

    pub fn failure(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stderr: stderr.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct State {
    pods: BTreeMap<String, Pod>,
    polls: BTreeMap<String, usize>,
    created: Vec<Pod>,
    deleted: Vec<String>,
    execs: Vec<ExecCall>,
    responses: Vec<(String, ExecResponse)>,
    hangs: Vec<String>,
    files: HashSet<String>,
}

// =============================================================================
// Fake Cluster
// =============================================================================

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
    polls_until_running: usize,
    never_running: bool,
    fail_deletes: bool,
    extraction_is_lost: bool,
    create_delay: Option<Duration>,
    final_phase: Option<&'static str>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status polls answered Pending before a helper turns Running.
    pub fn running_after(mut self, polls: usize) -> Self {
        self.polls_until_running = polls;
        self
    }

    /// Helpers never leave Pending.
    pub fn never_running(mut self) -> Self {
        self.never_running = true;
        self
    }

    /// Creates reach the server at once but answer only after `delay`.
    pub fn slow_creates(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    /// Helpers report `phase` (e.g. `Failed`) on every poll.
    pub fn ending_in(mut self, phase: &'static str) -> Self {
        self.final_phase = Some(phase);
        self
    }

    /// Every delete fails with a cluster error.
    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    /// `tar -xf -` exits 0 without creating the file.
    pub fn losing_extractions(mut self) -> Self {
        self.extraction_is_lost = true;
        self
    }

    pub fn respond(&self, pattern: &str, response: ExecResponse) {
        self.lock().responses.push((pattern.to_string(), response));
    }

    /// Commands containing `pattern` stream their scripted stdout and then
    /// never exit.
    pub fn hang_on(&self, pattern: &str) {
        self.lock().hangs.push(pattern.to_string());
    }

    pub fn add_file(&self, path: &str) {
        self.lock().files.insert(path.to_string());
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.lock().files.contains(path)
    }

    pub fn created(&self) -> Vec<Pod> {
        self.lock().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    pub fn live_pods(&self) -> Vec<String> {
        self.lock().pods.keys().cloned().collect()
    }

    pub fn execs(&self) -> Vec<ExecCall> {
        self.lock().execs.clone()
    }

    pub fn exec_lines(&self) -> Vec<String> {
        self.lock().execs.iter().map(ExecCall::joined).collect()
    }

    pub fn count_execs(&self, pattern: &str) -> usize {
        self.exec_lines().iter().filter(|c| c.contains(pattern)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn existence(&self, path: &str) -> ExecResponse {
        if self.has_file(path) {
            ExecResponse::stdout(format!("-rwxr-xr-x 1 root root 1024 Jan 1 00:00 {path}\n"))
        } else {
            ExecResponse::failure(2, &format!("ls: {path}: No such file or directory"))
        }
    }

    fn extract(&self, command: &[String], stdin: Option<&[u8]>) -> ExecResponse {
        if self.extraction_is_lost {
            return ExecResponse::default();
        }
        let dir = command
            .iter()
            .position(|a| a == "-C")
            .and_then(|i| command.get(i + 1))
            .cloned()
            .unwrap_or_default();
        let mut archive = tar::Archive::new(stdin.unwrap_or_default());
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut sink = Vec::new();
            entry.read_to_end(&mut sink).unwrap();
            let path = if dir.is_empty() {
                name
            } else {
                format!("{}/{}", dir.trim_end_matches('/'), name)
            };
            self.add_file(&path);
        }
        ExecResponse::default()
    }

    fn scripted(&self, joined: &str) -> Option<ExecResponse> {
        self.lock()
            .responses
            .iter()
            .find(|(pattern, _)| joined.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
    }
}

#[async_trait]
impl PodClient for FakeCluster {
    async fn create_pod(&self, _namespace: &str, pod: &Pod) -> Result<Pod> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        {
            let mut state = self.lock();
            state.created.push(pod.clone());
            state.pods.insert(name, pod.clone());
        }
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(pod.clone())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        let mut state = self.lock();
        let polls = {
            let count = state.polls.entry(name.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let pod = state.pods.get_mut(name).ok_or_else(|| {
            Error::InvalidTarget(format!("pod '{name}' not found in namespace '{namespace}'"))
        })?;
        let phase = if let Some(phase) = self.final_phase {
            phase
        } else if !self.never_running && polls > self.polls_until_running {
            "Running"
        } else {
            "Pending"
        };
        pod.status = Some(PodStatus {
            phase: Some(phase.to_string()),
            ..PodStatus::default()
        });
        Ok(pod.clone())
    }

    async fn delete_pod(&self, _namespace: &str, name: &str, _grace: u32) -> Result<DeleteOutcome> {
        if self.fail_deletes {
            return Err(Error::Cluster {
                operation: "delete pod".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        let mut state = self.lock();
        state.deleted.push(name.to_string());
        Ok(match state.pods.remove(name) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }
}

#[async_trait]
impl RemoteExecutor for FakeCluster {
    async fn exec(
        &self,
        target: &ExecTarget,
        command: &[String],
        stdin: Option<Vec<u8>>,
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<ExecStatus> {
        let joined = display_command(command);
        self.lock().execs.push(ExecCall {
            target: target.clone(),
            command: command.to_vec(),
            stdin: stdin.clone(),
        });

        let response = match (self.scripted(&joined), command) {
            (Some(response), _) => response,
            (None, [shell, flag, script])
                if shell == "/bin/sh" && flag == "-c" && script.starts_with("ls -alt ") =>
            {
                self.existence(script.trim_start_matches("ls -alt "))
            }
            (None, [tar, ..]) if tar == "tar" => self.extract(command, stdin.as_deref()),
            (None, _) => ExecResponse::default(),
        };

        stdout.write_all(&response.stdout).await?;
        stdout.flush().await?;

        let hangs = self.lock().hangs.iter().any(|p| joined.contains(p.as_str()));
        if hangs {
            std::future::pending::<()>().await;
        }

        Ok(ExecStatus {
            exit_code: response.exit_code,
            stderr: response.stderr,
        })
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn handles(cluster: &Arc<FakeCluster>) -> ClusterHandles {
    ClusterHandles {
        pods: cluster.clone(),
        executor: cluster.clone(),
        names: Arc::new(SequentialSuffix::new()),
    }
}

/// A running pod `web-0` in `shop` on `node-a` with containers `app` and
/// `sidecar`; `app` carries `container_id`.
pub fn target_pod(container_id: &str) -> Pod {
    let status = |name: &str, id: &str| ContainerStatus {
        name: name.to_string(),
        container_id: Some(id.to_string()),
        ..ContainerStatus::default()
    };
    Pod {
        metadata: ObjectMeta {
            name: Some("web-0".to_string()),
            namespace: Some("shop".to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            node_name: Some("node-a".to_string()),
            containers: vec![
                Container {
                    name: "app".to_string(),
                    ..Container::default()
                },
                Container {
                    name: "sidecar".to_string(),
                    ..Container::default()
                },
            ],
            ..PodSpec::default()
        }),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            container_statuses: Some(vec![
                status("app", container_id),
                status("sidecar", "containerd://5ideca5"),
            ]),
            ..PodStatus::default()
        }),
    }
}
