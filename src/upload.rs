//! Remote file deployment.
//!
//! Places a local file into a container by streaming a one-entry tar
//! archive into `tar -xf -`. The deploy is idempotent: if the path already
//! exists nothing is sent, and after extraction the path is checked again.

use std::path::Path;
use std::sync::Arc;

use tokio::io;
use tracing::{debug, info};

use crate::archive::wrap_as_tar;
use crate::cluster::{exec_buffered, ExecTarget, RemoteExecutor};
use crate::constants::MAX_UPLOAD_SIZE;
use crate::error::{Error, Result};
use crate::runtime::display_command;

/// What [`FileDeployer::ensure_present`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The path already existed; nothing was sent.
    AlreadyPresent,
    /// The file was uploaded and verified.
    Uploaded { bytes: usize },
}

/// Uploads files into containers through a [`RemoteExecutor`].
#[derive(Clone)]
pub struct FileDeployer {
    executor: Arc<dyn RemoteExecutor>,
}

impl FileDeployer {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { executor }
    }

    /// Makes sure `remote_path` exists in `target`, uploading `content` if not.
    pub async fn ensure_present(
        &self,
        content: &[u8],
        remote_path: &str,
        target: &ExecTarget,
    ) -> Result<UploadOutcome> {
        if self.exists(remote_path, target).await? {
            info!("'{}' already present on container, skipping upload", remote_path);
            return Ok(UploadOutcome::AlreadyPresent);
        }

        if content.len() > MAX_UPLOAD_SIZE {
            return Err(Error::Config(format!(
                "refusing to upload {} bytes to '{}' (limit {} bytes)",
                content.len(),
                remote_path,
                MAX_UPLOAD_SIZE
            )));
        }

        info!("'{}' not found on container, starting upload", remote_path);
        let (dest_dir, file_name) = split_remote_path(remote_path)?;
        let archive = wrap_as_tar(file_name, content)?;
        debug!("wrapped {} bytes as tar of {} bytes", content.len(), archive.len());

        let command = extraction_command(dest_dir);
        let status = self
            .executor
            .exec(target, &command, Some(archive), &mut io::sink())
            .await?;
        status.check(&command)?;

        if !self.exists(remote_path, target).await? {
            return Err(Error::UploadUnverifiable {
                path: remote_path.to_string(),
            });
        }

        info!("uploaded {} bytes to '{}'", content.len(), remote_path);
        Ok(UploadOutcome::Uploaded {
            bytes: content.len(),
        })
    }

    /// Checks whether `remote_path` exists in `target`.
    ///
    /// `ls` exit 0 means present, 1 or 2 means absent. Any other exit code,
    /// or exit 0 with stderr output, is an error.
    pub async fn exists(&self, remote_path: &str, target: &ExecTarget) -> Result<bool> {
        let command = existence_check_command(remote_path);
        let output = exec_buffered(self.executor.as_ref(), target, &command, None).await?;
        let stderr = output.status.stderr.trim();

        match output.status.exit_code {
            0 if stderr.is_empty() => Ok(true),
            1 | 2 => {
                debug!("'{}' not found: {}", remote_path, stderr);
                Ok(false)
            }
            exit_code => Err(Error::RemoteCommandFailed {
                command: display_command(&command),
                exit_code,
                stderr: stderr.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for FileDeployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDeployer").finish_non_exhaustive()
    }
}

/// `ls -alt <path>` through a shell.
pub fn existence_check_command(remote_path: &str) -> Vec<String> {
    vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        format!("ls -alt {remote_path}"),
    ]
}

/// `tar -xf -`, extracting into `dest_dir` when it is non-empty.
pub fn extraction_command(dest_dir: &str) -> Vec<String> {
    let mut command = vec!["tar".to_string(), "-xf".to_string(), "-".to_string()];
    if !dest_dir.is_empty() {
        command.push("-C".to_string());
        command.push(dest_dir.to_string());
    }
    command
}

/// Splits a remote path into its directory (possibly empty) and file name.
fn split_remote_path(remote_path: &str) -> Result<(&str, &str)> {
    let path = Path::new(remote_path);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Config(format!("remote path '{remote_path}' has no file name")))?;
    let dir = path.parent().and_then(|p| p.to_str()).unwrap_or_default();
    Ok((dir, file_name))
}
