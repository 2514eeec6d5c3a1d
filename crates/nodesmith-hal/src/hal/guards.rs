use crate::MountOps;
use std::path::{Path, PathBuf};

/// RAII guard that unmounts a target path when dropped.
#[derive(Debug)]
pub struct MountGuard<'a, H: MountOps + ?Sized> {
    hal: &'a H,
    target: PathBuf,
    dry_run: bool,
    active: bool,
}

impl<'a, H: MountOps + ?Sized> MountGuard<'a, H> {
    pub fn new(hal: &'a H, target: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            hal,
            target: target.into(),
            dry_run,
            active: true,
        }
    }

    /// Prevent automatic unmounting and return the target path.
    pub fn release(mut self) -> PathBuf {
        self.active = false;
        self.target.clone()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl<'a, H: MountOps + ?Sized> Drop for MountGuard<'a, H> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(err) = self.hal.unmount(&self.target, self.dry_run) {
            log::warn!(
                "mount guard failed to unmount {}: {}",
                self.target.display(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FakeHal, MountOptions};
    use std::path::Path;

    #[test]
    fn mount_guard_unmounts_on_drop() {
        let hal = FakeHal::new();
        let target = Path::new("/mnt/test");

        hal.mount_device(
            Path::new("/dev/sda1"),
            target,
            Some("vfat"),
            MountOptions::new(),
            false,
        )
        .unwrap();
        assert!(hal.is_mounted(target).unwrap());

        {
            let _guard = MountGuard::new(&hal, target.to_path_buf(), false);
        }

        assert!(!hal.is_mounted(target).unwrap());
    }

    #[test]
    fn mount_guard_release_skips_unmount() {
        let hal = FakeHal::new();
        let target = Path::new("/mnt/keep");

        hal.mount_device(
            Path::new("/dev/sda2"),
            target,
            Some("ext4"),
            MountOptions::new(),
            false,
        )
        .unwrap();
        assert!(hal.is_mounted(target).unwrap());

        {
            let guard = MountGuard::new(&hal, target.to_path_buf(), false);
            let _ = guard.release();
        }

        assert!(hal.is_mounted(target).unwrap());
    }
}
