//! Capture configuration.
//!
//! Configuration is an immutable value built once by the caller. Defaults
//! that depend on the runtime (images, socket path) are resolved against the
//! selected bridge before setup and never re-derived afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    DEFAULT_CAPTURE_IMAGE, DEFAULT_INTERFACE, DEFAULT_POD_CREATION_TIMEOUT,
    DEFAULT_REMOTE_BINARY_PATH, STATIC_BINARY_NAME,
};
use crate::error::{Error, Result};
use crate::runtime::ContainerRuntimeBridge;

// =============================================================================
// Capture Spec
// =============================================================================

/// What to capture, with optional overrides of runtime defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSpec {
    /// Interface to capture on.
    pub interface: String,
    /// Capture filter expression, passed through verbatim.
    pub filter: String,
    /// Wait for the helper pod; zero waits indefinitely.
    pub pod_creation_timeout: Duration,
    /// Capture image override.
    pub capture_image: Option<String>,
    /// Helper image override.
    pub helper_image: Option<String>,
    /// Runtime socket path override.
    pub socket_path: Option<String>,
}

impl Default for CaptureSpec {
    fn default() -> Self {
        Self {
            interface: DEFAULT_INTERFACE.to_string(),
            filter: String::new(),
            pod_creation_timeout: DEFAULT_POD_CREATION_TIMEOUT,
            capture_image: None,
            helper_image: None,
            socket_path: None,
        }
    }
}

impl CaptureSpec {
    pub fn new(interface: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            filter: filter.into(),
            ..Self::default()
        }
    }

    /// Fills unset images and socket path from `bridge`.
    pub fn resolve(&self, bridge: &ContainerRuntimeBridge) -> ResolvedCapture {
        ResolvedCapture {
            interface: self.interface.clone(),
            filter: self.filter.clone(),
            pod_creation_timeout: self.pod_creation_timeout,
            capture_image: self
                .capture_image
                .clone()
                .unwrap_or_else(|| bridge.default_capture_image().to_string()),
            helper_image: self
                .helper_image
                .clone()
                .unwrap_or_else(|| bridge.default_image().to_string()),
            socket_path: self
                .socket_path
                .clone()
                .unwrap_or_else(|| bridge.default_socket_path().to_string()),
        }
    }

    /// Fills unset images for node-wide capture (no runtime involved).
    pub fn resolve_for_node(&self) -> ResolvedCapture {
        let image = self
            .helper_image
            .clone()
            .unwrap_or_else(|| DEFAULT_CAPTURE_IMAGE.to_string());
        ResolvedCapture {
            interface: self.interface.clone(),
            filter: self.filter.clone(),
            pod_creation_timeout: self.pod_creation_timeout,
            capture_image: image.clone(),
            helper_image: image,
            socket_path: String::new(),
        }
    }
}

/// [`CaptureSpec`] with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCapture {
    pub interface: String,
    pub filter: String,
    pub pod_creation_timeout: Duration,
    pub capture_image: String,
    pub helper_image: String,
    pub socket_path: String,
}

// =============================================================================
// Sniffing Mode
// =============================================================================

/// How the capture process reaches the target's traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SniffMode {
    /// Upload a static capture binary into the target container.
    #[default]
    StaticUpload,
    /// Attach from a privileged helper pod through the container runtime.
    Privileged,
    /// Capture every interface of the target's node.
    Node,
}

impl std::fmt::Display for SniffMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaticUpload => write!(f, "static-upload"),
            Self::Privileged => write!(f, "privileged"),
            Self::Node => write!(f, "node"),
        }
    }
}

// =============================================================================
// Static Binary Upload
// =============================================================================

/// Local capture binary and where to place it in the target container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticBinarySpec {
    pub local_path: PathBuf,
    pub remote_path: String,
}

impl StaticBinarySpec {
    pub fn new(local_path: impl Into<PathBuf>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: DEFAULT_REMOTE_BINARY_PATH.to_string(),
        }
    }

    pub fn with_remote_path(mut self, remote_path: impl Into<String>) -> Self {
        self.remote_path = remote_path.into();
        self
    }
}

/// Places searched for the static capture binary, in priority order.
pub fn static_binary_candidates(user_path: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = user_path {
        candidates.push(path.to_path_buf());
    }
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.canonicalize().ok())
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(dir.join(STATIC_BINARY_NAME));
    }
    candidates.push(Path::new("/usr/local/bin").join(STATIC_BINARY_NAME));
    if let Some(home) = dirs::home_dir() {
        candidates.push(
            home.join(".kube")
                .join("plugin")
                .join("sniff")
                .join(STATIC_BINARY_NAME),
        );
    }
    candidates
}

/// Returns the first existing candidate.
pub fn locate_static_binary(candidates: &[PathBuf]) -> Result<PathBuf> {
    for candidate in candidates {
        if candidate.is_file() {
            debug!("static capture binary found at: '{}'", candidate.display());
            return Ok(candidate.clone());
        }
        debug!("static capture binary not found at: '{}'", candidate.display());
    }

    let listed: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
    Err(Error::Config(format!(
        "couldn't find static capture binary on any of: [{}]",
        listed.join(", ")
    )))
}

// =============================================================================
// Duration Parsing
// =============================================================================

/// Parses durations such as `0`, `500ms`, `20s`, `2m`, `1h`, `1m30s`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(Error::Config("empty duration".to_string()));
    }

    let invalid = || Error::Config(format!("invalid duration '{input}' (e.g. 20s, 2m, 1h)"));
    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest.chars().take_while(char::is_ascii_alphabetic).count();
        let part = match &rest[..unit_len] {
            "ms" => Some(Duration::from_millis(value)),
            "s" => Some(Duration::from_secs(value)),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total = part
            .and_then(|part| total.checked_add(part))
            .ok_or_else(|| Error::Config(format!("duration '{input}' is too large")))?;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeKind;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("20s").unwrap(), Duration::from_secs(20));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("ten s").is_err());
        assert!(parse_duration("5d").is_err());

        // overflowing values are rejected, not panicked on
        assert!(parse_duration("5124095576030432h").is_err());
        assert!(parse_duration("307445734561825861m").is_err());
        assert!(parse_duration("18446744073709551615s1s").is_err());
        assert_eq!(
            parse_duration("18446744073709551615s").unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn test_resolve_uses_bridge_defaults() {
        let bridge = ContainerRuntimeBridge::new(RuntimeKind::Containerd);
        let resolved = CaptureSpec::new("eth0", "port 53").resolve(&bridge);

        assert_eq!(resolved.interface, "eth0");
        assert_eq!(resolved.filter, "port 53");
        assert_eq!(resolved.helper_image, bridge.default_image());
        assert_eq!(resolved.capture_image, bridge.default_capture_image());
        assert_eq!(resolved.socket_path, bridge.default_socket_path());
    }

    #[test]
    fn test_resolve_keeps_overrides() {
        let bridge = ContainerRuntimeBridge::new(RuntimeKind::Docker);
        let spec = CaptureSpec {
            helper_image: Some("my/helper".to_string()),
            capture_image: Some("my/tcpdump".to_string()),
            socket_path: Some("/run/docker.sock".to_string()),
            ..CaptureSpec::default()
        };
        let resolved = spec.resolve(&bridge);

        assert_eq!(resolved.interface, "any");
        assert_eq!(resolved.helper_image, "my/helper");
        assert_eq!(resolved.capture_image, "my/tcpdump");
        assert_eq!(resolved.socket_path, "/run/docker.sock");
    }

    #[test]
    fn test_locate_static_binary() {
        let dir = tempfile::TempDir::new().unwrap();
        let present = dir.path().join("static-tcpdump");
        std::fs::write(&present, b"\x7fELF").unwrap();
        let missing = dir.path().join("missing");

        let found = locate_static_binary(&[missing.clone(), present.clone()]).unwrap();
        assert_eq!(found, present);

        let err = locate_static_binary(&[missing]).unwrap_err();
        assert!(err.to_string().contains("couldn't find static capture binary"));
    }
}
