//! # kubesniff
//!
//! **Remote packet capture for containers running in Kubernetes pods**
//!
//! This crate attaches a packet capture to a running container without
//! touching its image, and streams the raw pcap bytes back to a local sink
//! (a file, stdout, or a packet viewer's stdin). Three strategies reach the
//! target's network namespace:
//!
//! - **static upload**: copy a static capture binary into the target
//!   container and run it there
//! - **privileged**: start a node-pinned privileged helper pod and attach
//!   through the node's container runtime
//! - **node**: capture on the node's own interfaces from a host-network helper
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            kubesniff                                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                     SnifferSession                          │    │
//! │  │        setup() → start(sink) → cleanup()  (once)            │    │
//! │  │            cancellation token races setup/start             │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │                              │                                      │
//! │  ┌──────────────┐  ┌─────────┴────────┐  ┌──────────────┐           │
//! │  │ StaticUpload │  │   Privileged     │  │    Node      │           │
//! │  │   Sniffer    │  │    Sniffer       │  │   Sniffer    │           │
//! │  └──────┬───────┘  └───┬─────────┬────┘  └──────┬───────┘           │
//! │         │              │         │              │                   │
//! │  ┌──────┴───────┐  ┌───┴─────┐ ┌─┴──────────────┴───┐               │
//! │  │ FileDeployer │  │ Runtime │ │  HelperPodManager  │               │
//! │  │  tar upload  │  │ Bridge  │ │ create/await/delete│               │
//! │  └──────┬───────┘  └─────────┘ └─────────┬──────────┘               │
//! ├─────────┴────────────────────────────────┴──────────────────────────┤
//! │          RemoteExecutor (exec)        PodClient (CRUD)              │
//! │                      KubeCluster (kube-rs)                          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Runtime Bridges
//!
//! | Runtime    | Attachment | Capture command                                 |
//! |------------|------------|-------------------------------------------------|
//! | CRI-O      | PID        | `nsenter -n -t <pid> -- tcpdump ...`            |
//! | Docker     | socket     | `docker run --net=container:<id> ...`           |
//! | containerd | socket     | `ctr run --with-ns network:<netns> ...`         |
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kubesniff::{build_sniffer, resolve_target, CaptureSpec, ClusterHandles,
//!     KubeCluster, PodClient, RandomSuffix, SniffMode, SnifferSession};
//!
//! #[tokio::main]
//! async fn main() -> kubesniff::Result<()> {
//!     let (cluster, namespace) = KubeCluster::connect(None).await?;
//!     let cluster = Arc::new(cluster);
//!     let pod = cluster.get_pod(&namespace, "web-0").await?;
//!     let target = resolve_target(&pod, None)?;
//!
//!     let handles = ClusterHandles {
//!         pods: cluster.clone(),
//!         executor: cluster,
//!         names: Arc::new(RandomSuffix),
//!     };
//!     let spec = CaptureSpec::new("any", "port 80");
//!     let sniffer = build_sniffer(SniffMode::Privileged, target, &spec, None, &handles)?;
//!
//!     let mut out = tokio::fs::File::create("web-0.pcap").await?;
//!     let mut session = SnifferSession::new(sniffer, Default::default());
//!     session.run(&mut out).await?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod error;
pub mod helper;
pub mod naming;
pub mod runtime;
pub mod session;
pub mod sniffer;
pub mod target;
pub mod upload;
pub mod wait;

pub mod runtimes;

// Re-exports
pub use archive::wrap_as_tar;
pub use cluster::{
    exec_buffered, BufferedOutput, DeleteOutcome, ExecStatus, ExecTarget, KubeCluster, PodClient,
    RemoteExecutor,
};
pub use config::{
    locate_static_binary, parse_duration, static_binary_candidates, CaptureSpec, ResolvedCapture,
    SniffMode, StaticBinarySpec,
};
pub use error::{Error, PidError, Result};
pub use helper::{HelperPodConfig, HelperPodHandle, HelperPodManager, PodPhase};
pub use naming::{NameGenerator, RandomSuffix, SequentialSuffix};
pub use runtime::{
    ContainerRuntimeBridge, PidBridge, RuntimeBridge, RuntimeKind, SiblingContainer, SocketBridge,
};
pub use runtimes::{ContainerdBridge, CrioBridge, DockerBridge};
pub use session::{spawn_interrupt_listener, CaptureEnd, SessionReport, SessionState, SnifferSession};
pub use sniffer::{
    build_sniffer, CleanupReport, ClusterHandles, NodeSniffer, PrivilegedSniffer, SetupOutcome,
    Sniffer, StaticUploadSniffer,
};
pub use target::{resolve_target, ContainerDescriptor, TargetContainer};
pub use upload::{FileDeployer, UploadOutcome};
pub use wait::run_while_false;
