//! CRI-O bridge.
//!
//! Reads the target's host PID from `crictl inspect` and enters its network
//! namespace with `nsenter`. Nothing is created, so nothing is cleaned up.
//!
//! # Inspection Schemas
//!
//! CRI-O changed where `crictl inspect` reports the PID:
//!
//! ```text
//! <= 1.17:  { "pid": 69417, "status": {...} }
//! >= 1.18:  { "status": {...}, "info": { "pid": 827137, ... } }
//! ```
//!
//! The top-level field wins when present; the nested one is the fallback.

use crate::constants::{CAPTURE_BINARY, CRIO_SOCKET_PATH, DEFAULT_CAPTURE_IMAGE, HOST_ROOT_MOUNT};
use crate::error::PidError;
use crate::runtime::{PidBridge, RuntimeBridge, RuntimeKind};
use serde_json::{Map, Value};

/// Bridge for CRI-O nodes.
#[derive(Debug, Default, Clone)]
pub struct CrioBridge;

impl CrioBridge {
    pub fn new() -> Self {
        Self
    }
}

impl RuntimeBridge for CrioBridge {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::CriO
    }

    fn default_image(&self) -> &'static str {
        DEFAULT_CAPTURE_IMAGE
    }

    fn default_capture_image(&self) -> &'static str {
        DEFAULT_CAPTURE_IMAGE
    }

    fn default_socket_path(&self) -> &'static str {
        CRIO_SOCKET_PATH
    }
}

impl PidBridge for CrioBridge {
    fn build_inspect_command(&self, container_id: &str) -> Vec<String> {
        vec![
            "chroot".to_string(),
            HOST_ROOT_MOUNT.to_string(),
            "crictl".to_string(),
            "inspect".to_string(),
            "--output".to_string(),
            "json".to_string(),
            container_id.to_string(),
        ]
    }

    fn extract_pid(&self, inspection: &str) -> Result<String, PidError> {
        let trimmed = inspection.trim();
        if trimmed.is_empty() {
            return Err(PidError::Empty);
        }

        let doc: Value =
            serde_json::from_str(trimmed).map_err(|e| PidError::Malformed(e.to_string()))?;
        let doc = doc
            .as_object()
            .ok_or_else(|| PidError::Malformed("expected a JSON object".to_string()))?;

        if let Some(pid) = doc.get("pid") {
            return pid_from_value(pid, "pid");
        }

        match doc.get("info") {
            Some(Value::Object(info)) => nested_pid(info),
            Some(other) => Err(PidError::Malformed(format!(
                "field 'info' is not an object: {other}"
            ))),
            None => Err(PidError::UnrecognizedSchema),
        }
    }

    fn build_capture_command(&self, pid: &str, interface: &str, filter: &str) -> Vec<String> {
        vec![
            "nsenter".to_string(),
            "-n".to_string(),
            "-t".to_string(),
            pid.to_string(),
            "--".to_string(),
            CAPTURE_BINARY.to_string(),
            "-i".to_string(),
            interface.to_string(),
            "-U".to_string(),
            "-w".to_string(),
            "-".to_string(),
            filter.to_string(),
        ]
    }
}

fn nested_pid(info: &Map<String, Value>) -> Result<String, PidError> {
    let pid = info
        .get("pid")
        .ok_or(PidError::MissingPid { field: "info.pid" })?;
    pid_from_value(pid, "info.pid")
}

fn pid_from_value(value: &Value, field: &'static str) -> Result<String, PidError> {
    let invalid = || PidError::InvalidPid {
        field,
        value: value.to_string(),
    };

    // JSON numbers may arrive as floats (`69417.0`); accept integral values only.
    let pid = match value.as_u64() {
        Some(pid) => pid,
        None => {
            let f = value.as_f64().ok_or_else(invalid)?;
            if f.fract() != 0.0 || f < 1.0 || f > u32::MAX as f64 {
                return Err(invalid());
            }
            f as u64
        }
    };

    if pid == 0 {
        return Err(invalid());
    }
    Ok(pid.to_string())
}
