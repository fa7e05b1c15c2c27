//! kubectl-sniff - capture a pod's network traffic
//!
//! ## Usage
//!
//! ```sh
//! kubectl sniff <pod> [-n namespace] [-c container] [-i interface] [-f filter]
//! kubectl sniff <pod> -p                 # privileged helper pod
//! kubectl sniff <pod> --node -i any      # everything on the pod's node
//! kubectl sniff <pod> -o capture.pcap    # write to a file ('-' for stdout)
//! ```
//!
//! Without `-o` the capture is piped into a local `wireshark`.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::AsyncWrite;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use kubesniff::{
    build_sniffer, locate_static_binary, parse_duration, resolve_target,
    spawn_interrupt_listener, static_binary_candidates, CaptureEnd, CaptureSpec, ClusterHandles,
    KubeCluster, PodClient, RandomSuffix, SniffMode, SnifferSession, StaticBinarySpec,
    TargetContainer,
};

/// Capture network traffic of a container running in a Kubernetes pod
#[derive(Parser, Debug)]
#[command(name = "kubectl-sniff", version)]
struct Args {
    /// Pod to sniff
    pod: String,

    /// Namespace of the pod (defaults to the context's namespace)
    #[arg(short, long, env = "KUBECTL_PLUGINS_CURRENT_NAMESPACE")]
    namespace: Option<String>,

    /// Container to sniff (defaults to the pod's first container)
    #[arg(short, long, env = "KUBECTL_PLUGINS_LOCAL_FLAG_CONTAINER")]
    container: Option<String>,

    /// Interface to capture on
    #[arg(short, long, default_value = "any", env = "KUBECTL_PLUGINS_LOCAL_FLAG_INTERFACE")]
    interface: String,

    /// Capture filter expression
    #[arg(short, long, default_value = "", env = "KUBECTL_PLUGINS_LOCAL_FLAG_FILTER")]
    filter: String,

    /// Write the capture to this file instead of wireshark ('-' for stdout)
    #[arg(short, long, env = "KUBECTL_PLUGINS_LOCAL_FLAG_OUTPUT_FILE")]
    output_file: Option<String>,

    /// Local static capture binary to upload
    #[arg(short, long, env = "KUBECTL_PLUGINS_LOCAL_FLAG_LOCAL_TCPDUMP_PATH")]
    local_tcpdump_path: Option<PathBuf>,

    /// Where to place the capture binary inside the target container
    #[arg(
        short,
        long,
        default_value = kubesniff::constants::DEFAULT_REMOTE_BINARY_PATH,
        env = "KUBECTL_PLUGINS_LOCAL_FLAG_REMOTE_TCPDUMP_PATH"
    )]
    remote_tcpdump_path: String,

    /// Capture from a privileged helper pod instead of uploading a binary
    #[arg(short, long, env = "KUBECTL_PLUGINS_LOCAL_FLAG_PRIVILEGED")]
    privileged: bool,

    /// Capture every interface of the pod's node
    #[arg(long, conflicts_with = "privileged")]
    node: bool,

    /// How long to wait for the helper pod to run ('0' waits forever)
    #[arg(long, default_value = "1m", value_parser = parse_timeout)]
    pod_creation_timeout: Duration,

    /// Helper pod image
    #[arg(long, env = "KUBECTL_PLUGINS_LOCAL_FLAG_IMAGE")]
    image: Option<String>,

    /// Capture image used by socket-based runtimes
    #[arg(long, env = "KUBECTL_PLUGINS_LOCAL_FLAG_TCPDUMP_IMAGE")]
    tcpdump_image: Option<String>,

    /// Container runtime socket on the node
    #[arg(long, env = "KUBECTL_PLUGINS_SOCKET_PATH")]
    socket: Option<String>,

    /// Kubeconfig context to use
    #[arg(short = 'x', long, env = "KUBECTL_PLUGINS_CURRENT_CONTEXT")]
    context: Option<String>,

    /// Verbose logging
    #[arg(short, long, env = "KUBECTL_PLUGINS_LOCAL_FLAG_VERBOSE")]
    verbose: bool,
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

impl Args {
    fn mode(&self) -> SniffMode {
        if self.node {
            SniffMode::Node
        } else if self.privileged {
            SniffMode::Privileged
        } else {
            SniffMode::StaticUpload
        }
    }

    fn capture_spec(&self) -> CaptureSpec {
        CaptureSpec {
            interface: self.interface.clone(),
            filter: self.filter.clone(),
            pod_creation_timeout: self.pod_creation_timeout,
            capture_image: self.tcpdump_image.clone(),
            helper_image: self.image.clone(),
            socket_path: self.socket.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG takes precedence; logs go to stderr so '-o -' stays clean
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    run(args).await
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mode = args.mode();
    let binary = match mode {
        SniffMode::StaticUpload => {
            let candidates = static_binary_candidates(args.local_tcpdump_path.as_deref());
            let local = locate_static_binary(&candidates)?;
            Some(StaticBinarySpec::new(local).with_remote_path(&args.remote_tcpdump_path))
        }
        SniffMode::Privileged | SniffMode::Node => None,
    };

    let (cluster, default_namespace) = KubeCluster::connect(args.context.as_deref()).await?;
    let cluster = Arc::new(cluster);
    let namespace = args.namespace.clone().unwrap_or(default_namespace);

    let pod = cluster
        .get_pod(&namespace, &args.pod)
        .await
        .with_context(|| format!("failed to get pod '{}'", args.pod))?;
    let target = resolve_target(&pod, args.container.as_deref())?;
    tracing::info!(
        namespace = %target.namespace,
        pod = %target.pod,
        container = %target.container,
        node = %target.node_name,
        runtime = %target.descriptor.runtime(),
        mode = %mode,
        "resolved capture target"
    );

    let title = format!("gui.window_title:{}", describe(&target));
    let handles = ClusterHandles {
        pods: cluster.clone(),
        executor: cluster,
        names: Arc::new(RandomSuffix),
    };
    let sniffer = build_sniffer(mode, target, &args.capture_spec(), binary, &handles)?;

    let cancel = CancellationToken::new();
    spawn_interrupt_listener(cancel.clone());
    let mut session = SnifferSession::new(sniffer, cancel.clone());

    match args.output_file.as_deref() {
        Some("-") => {
            let mut stdout = tokio::io::stdout();
            finish(session.run(&mut stdout).await)
        }
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("failed to create output file '{path}'"))?;
            tracing::info!("writing capture to '{}'", path);
            finish(session.run(&mut file).await)
        }
        None => run_with_wireshark(&mut session, &cancel, &title).await,
    }
}

async fn run_with_wireshark(
    session: &mut SnifferSession,
    cancel: &CancellationToken,
    title: &str,
) -> anyhow::Result<()> {
    tracing::info!("spawning wireshark");
    let mut child = Command::new("wireshark")
        .args(["-k", "-i", "-", "-o", title])
        .stdin(Stdio::piped())
        .spawn()
        .context("failed to start wireshark, is it installed? (use -o to write to a file)")?;
    let mut stdin: Box<dyn AsyncWrite + Send + Unpin> = match child.stdin.take() {
        Some(stdin) => Box::new(stdin),
        None => bail!("wireshark stdin not available"),
    };

    let run = session.run(stdin.as_mut());
    tokio::pin!(run);

    let result = tokio::select! {
        result = &mut run => result,
        status = child.wait() => {
            tracing::info!("wireshark exited ({:?}), stopping capture", status.ok());
            cancel.cancel();
            run.await
        }
    };

    stop_viewer(&mut child).await;
    finish(result)
}

async fn stop_viewer(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    if let Err(e) = child.kill().await {
        tracing::warn!("failed to stop wireshark: {}", e);
    }
}

fn finish(result: kubesniff::Result<kubesniff::SessionReport>) -> anyhow::Result<()> {
    let report = result?;
    let elapsed = report.finished_at - report.started_at;
    match report.capture {
        CaptureEnd::Completed => tracing::info!(
            "capture completed after {}s",
            elapsed.num_seconds()
        ),
        CaptureEnd::Interrupted => tracing::info!(
            "capture interrupted after {}s",
            elapsed.num_seconds()
        ),
    }
    if !report.cleanup.is_clean() {
        tracing::warn!("some resources could not be removed, see warnings above");
    }
    Ok(())
}

fn describe(target: &TargetContainer) -> String {
    format!("{}/{}/{}", target.namespace, target.pod, target.container)
}
