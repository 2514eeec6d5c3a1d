//! Small helpers for reasoning about block device paths.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Get a partition's device path, handling nvme/mmcblk/loop naming.
pub fn partition_path(device: &Path, num: u32) -> PathBuf {
    let base = device.display().to_string();
    if base.contains("nvme") || base.contains("mmcblk") || base.contains("loop") {
        PathBuf::from(format!("{}p{}", base, num))
    } else {
        PathBuf::from(format!("{}{}", base, num))
    }
}

/// Check that a destructive-operation target looks usable.
///
/// Regular files are accepted (loopback-style images and tests); anything
/// else that is not a block device is rejected.
pub fn validate_target(device: &Path) -> Result<()> {
    use std::os::unix::fs::FileTypeExt;

    let meta = match std::fs::metadata(device) {
        Ok(meta) => meta,
        Err(_) => bail!("Device not found: {}", device.display()),
    };

    let ft = meta.file_type();
    if ft.is_block_device() {
        return Ok(());
    }
    if ft.is_file() {
        log::warn!(
            "{} is a regular file, not a block device; continuing (loopback image?)",
            device.display()
        );
        return Ok(());
    }
    bail!("{} is not a block device", device.display());
}
