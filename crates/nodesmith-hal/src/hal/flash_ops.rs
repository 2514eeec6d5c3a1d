//! Disk image flashing operations trait.

use crate::HalResult;
use std::path::Path;

/// Options for destructive flash operations.
#[derive(Debug, Clone)]
pub struct FlashOptions {
    pub dry_run: bool,
    pub confirmed: bool,
}

impl FlashOptions {
    pub fn new(dry_run: bool, confirmed: bool) -> Self {
        Self { dry_run, confirmed }
    }
}

/// Trait for flashing disk images to block devices.
pub trait FlashOps {
    /// Flash a raw disk image to a target block device.
    ///
    /// Supports both raw images and `.xz`-compressed images, streaming the
    /// decompression so no intermediate uncompressed file is needed.
    ///
    /// `on_progress` receives `(bytes_written, bytes_total)`; `bytes_total`
    /// is 0 when the uncompressed length is unknown.
    fn flash_raw_image(
        &self,
        image_path: &Path,
        target_disk: &Path,
        opts: &FlashOptions,
        on_progress: &mut dyn FnMut(u64, u64),
    ) -> HalResult<()>;
}
