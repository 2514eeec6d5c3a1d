//! Whole-system helpers used between destructive steps.

use crate::HalResult;
use std::path::Path;

pub trait SystemOps {
    /// Flush pending writes (`sync`).
    fn sync(&self) -> HalResult<()>;

    /// Ask the kernel to re-read a disk's partition table (`partprobe`).
    fn partprobe(&self, disk: &Path) -> HalResult<()>;

    /// Wait for udev to finish processing events (`udevadm settle`).
    fn udev_settle(&self) -> HalResult<()>;
}
