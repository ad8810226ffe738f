//! Device files and mountpoints

use fusevisor_common::SupervisorResult;
use fusevisor_process::{run, RunOptions};
use std::fs::{DirBuilder, OpenOptions};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEVICE_1G_SIZE: u64 = 1024 * 1024 * 1024;

/// Create a new sparse file of `size` bytes, readable only by the owner.
///
/// Fails if `path` already exists.
pub fn sparse_file(path: impl AsRef<Path>, size: u64) -> SupervisorResult<PathBuf> {
    let path = path.as_ref();
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.set_len(size)?;

    debug!(path = %path.display(), size, "Created sparse file");
    Ok(path.to_path_buf())
}

/// `dir/dev-1g`, a 1 GiB sparse file.
pub fn device_1g(dir: impl AsRef<Path>) -> SupervisorResult<PathBuf> {
    sparse_file(dir.as_ref().join("dev-1g"), DEVICE_1G_SIZE)
}

/// Create `dir/dev-1g` and run `<binary> format <dev>` on it.
///
/// A failing format is a `CommandFailed` error.
pub async fn format_1g(binary: impl AsRef<Path>, dir: impl AsRef<Path>) -> SupervisorResult<PathBuf> {
    let dev = device_1g(dir)?;
    run(binary.as_ref(), &[Path::new("format"), dev.as_path()], &RunOptions::checked()).await?;
    Ok(dev)
}

/// Create the mountpoint directory `dir/mnt` (mode 0700).
pub fn mountpoint(dir: impl AsRef<Path>) -> SupervisorResult<PathBuf> {
    let path = dir.as_ref().join("mnt");
    DirBuilder::new().mode(0o700).create(&path)?;
    Ok(path)
}
