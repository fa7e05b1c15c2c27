//! Single-entry tar archives for remote extraction.
//!
//! Uploads go through `tar -xf -` on the container, so the payload is wrapped
//! in a ustar stream holding exactly one regular file. Headers carry no
//! timestamps or ownership, so the output depends only on name and content.

use crate::constants::EXECUTABLE_MODE;
use crate::error::{Error, Result};
use tar::{Builder, EntryType, Header};

/// Wraps `content` as a tar stream with one executable entry named `entry_name`.
///
/// `entry_name` must be a bare file name; directories are created by the
/// extraction command (`-C <dir>`), never by the archive.
pub fn wrap_as_tar(entry_name: &str, content: &[u8]) -> Result<Vec<u8>> {
    if entry_name.is_empty() || entry_name.contains('/') || entry_name == "." || entry_name == ".." {
        return Err(Error::Archive(format!(
            "entry name must be a bare file name, got '{entry_name}'"
        )));
    }

    let mut header = Header::new_ustar();
    header
        .set_path(entry_name)
        .map_err(|e| Error::Archive(format!("invalid entry name '{entry_name}': {e}")))?;
    header.set_entry_type(EntryType::Regular);
    header.set_mode(EXECUTABLE_MODE);
    header.set_size(content.len() as u64);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_cksum();

    let mut builder = Builder::new(Vec::with_capacity(content.len() + 2048));
    builder
        .append(&header, content)
        .map_err(|e| Error::Archive(format!("failed to append '{entry_name}': {e}")))?;

    // into_inner writes the two zero blocks that terminate the archive.
    builder
        .into_inner()
        .map_err(|e| Error::Archive(format!("failed to finalize archive: {e}")))
}
