//! ext4 filesystem maintenance operations (e2fsck/resize2fs).

use crate::HalResult;
use std::path::Path;

pub trait FsOps {
    /// Run `e2fsck -f -y` on a partition.
    ///
    /// Exit codes 1 and 2 (errors corrected) are treated as success, matching
    /// how the filesystem is expected to look right after an image write.
    fn fsck_ext4(&self, device: &Path, dry_run: bool) -> HalResult<()>;

    /// Run `resize2fs` to resize a partition's filesystem.
    ///
    /// `size` is passed through verbatim (e.g. `"41943040s"` for a sector
    /// count); `None` grows the filesystem to fill the partition.
    fn resize_ext4(&self, device: &Path, size: Option<&str>, dry_run: bool) -> HalResult<()>;
}
