//! Fake HAL implementation for testing.
//!
//! This implementation records all operations without executing them,
//! allowing for CI-safe testing without root privileges or real hardware.

use super::{
    FlashOps, FlashOptions, FormatOps, FormatOptions, FsOps, MountOps, MountOptions, PartedOp,
    PartedOptions, PartitionOps, ProbeOps, ProcessOps, SystemOps,
};
use crate::{HalError, HalResult};
use std::collections::HashSet;
#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Operation records for testing and verification.
#[derive(Debug, Clone)]
pub enum Operation {
    FlashImage {
        image: PathBuf,
        target: PathBuf,
    },
    Parted {
        disk: PathBuf,
        op: String,
    },
    FsckExt4 {
        device: PathBuf,
    },
    ResizeExt4 {
        device: PathBuf,
        size: Option<String>,
    },
    FormatExt4 {
        device: PathBuf,
    },
    Mount {
        device: PathBuf,
        target: PathBuf,
        fstype: Option<String>,
    },
    Unmount {
        target: PathBuf,
    },
    Sync,
    Partprobe {
        disk: PathBuf,
    },
    UdevSettle,
    LsblkSize {
        disk: PathBuf,
    },
    LsblkMountpoints {
        disk: PathBuf,
    },
    LsblkTable {
        disk: PathBuf,
    },
    BlkidUuid {
        device: PathBuf,
    },
    Command {
        program: String,
        args: Vec<String>,
    },
}

/// Shared state for FakeHal operations.
#[derive(Debug, Default)]
struct FakeHalState {
    /// All operations that were recorded
    operations: Vec<Operation>,
    /// Currently mounted paths
    mounted_paths: HashSet<PathBuf>,
    /// Canned `lsblk -b -d` capacity answer
    disk_size_bytes: u64,
    /// Canned `lsblk MOUNTPOINT` answer
    mountpoints: Vec<PathBuf>,
    /// Canned machine-readable `parted print` answer
    parted_print: String,
    /// Canned stdout for `command_output*`
    command_stdout: Vec<u8>,
}

/// Fake HAL implementation that records operations without executing them.
///
/// This is designed for testing and CI environments where real system
/// operations would fail or be dangerous.
#[derive(Debug, Clone)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl Default for FakeHal {
    fn default() -> Self {
        Self::new()
    }
}

const DEFAULT_DISK_SIZE: u64 = 64 * 1024 * 1024 * 1024;

impl FakeHal {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeHalState {
                disk_size_bytes: DEFAULT_DISK_SIZE,
                ..Default::default()
            })),
        }
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.state.lock().unwrap().operations.clone()
    }

    /// Get the number of operations recorded.
    pub fn operation_count(&self) -> usize {
        self.state.lock().unwrap().operations.len()
    }

    /// Check if a specific operation was recorded.
    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.state.lock().unwrap().operations.iter().any(check)
    }

    /// Clear all recorded operations.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.operations.clear();
        state.mounted_paths.clear();
    }

    /// Set the capacity reported for whole-disk probes.
    pub fn set_disk_size_bytes(&self, size: u64) {
        self.state.lock().unwrap().disk_size_bytes = size;
    }

    /// Set the mountpoints reported for the target disk's partitions.
    pub fn set_mountpoints(&self, mountpoints: Vec<PathBuf>) {
        self.state.lock().unwrap().mountpoints = mountpoints;
    }

    /// Set the machine-readable `parted print` output.
    pub fn set_parted_print(&self, output: impl Into<String>) {
        self.state.lock().unwrap().parted_print = output.into();
    }

    /// Set the stdout returned by `command_output*`.
    pub fn set_command_stdout(&self, stdout: impl Into<Vec<u8>>) {
        self.state.lock().unwrap().command_stdout = stdout.into();
    }

    fn record_operation(&self, op: Operation) {
        self.state.lock().unwrap().operations.push(op);
    }

    fn success_output(&self) -> Output {
        #[cfg(unix)]
        let status = std::process::ExitStatus::from_raw(0);
        #[cfg(not(unix))]
        let status = std::process::Command::new("true").status().unwrap();

        Output {
            status,
            stdout: self.state.lock().unwrap().command_stdout.clone(),
            stderr: Vec::new(),
        }
    }
}

impl ProcessOps for FakeHal {
    fn command_output(
        &self,
        program: &str,
        args: &[&str],
        _timeout: Duration,
    ) -> HalResult<Output> {
        self.record_operation(Operation::Command {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        });
        Ok(self.success_output())
    }

    fn command_output_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        _stdin: &[u8],
        timeout: Duration,
    ) -> HalResult<Output> {
        self.command_output(program, args, timeout)
    }

    fn command_interactive(&self, program: &str, args: &[&str]) -> HalResult<i32> {
        self.record_operation(Operation::Command {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        });
        Ok(0)
    }

    fn command_status(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<()> {
        let _ = self.command_output(program, args, timeout)?;
        Ok(())
    }
}

impl FlashOps for FakeHal {
    fn flash_raw_image(
        &self,
        image_path: &Path,
        target_disk: &Path,
        opts: &FlashOptions,
        on_progress: &mut dyn FnMut(u64, u64),
    ) -> HalResult<()> {
        if !opts.dry_run && !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        if opts.dry_run {
            log::info!(
                "FAKE HAL DRY RUN: flash {} -> {}",
                image_path.display(),
                target_disk.display()
            );
            return Ok(());
        }

        self.record_operation(Operation::FlashImage {
            image: image_path.to_path_buf(),
            target: target_disk.to_path_buf(),
        });
        on_progress(0, 0);

        Ok(())
    }
}

impl PartitionOps for FakeHal {
    fn parted(&self, disk: &Path, op: PartedOp, opts: &PartedOptions) -> HalResult<String> {
        if let PartedOp::Print = op {
            self.record_operation(Operation::Parted {
                disk: disk.to_path_buf(),
                op: "Print".to_string(),
            });
            return Ok(self.state.lock().unwrap().parted_print.clone());
        }

        if !opts.dry_run && !opts.confirmed {
            return Err(HalError::SafetyLock);
        }
        self.record_operation(Operation::Parted {
            disk: disk.to_path_buf(),
            op: format!("{:?}", op),
        });
        Ok(String::new())
    }
}

impl FsOps for FakeHal {
    fn fsck_ext4(&self, device: &Path, _dry_run: bool) -> HalResult<()> {
        self.record_operation(Operation::FsckExt4 {
            device: device.to_path_buf(),
        });
        Ok(())
    }

    fn resize_ext4(&self, device: &Path, size: Option<&str>, _dry_run: bool) -> HalResult<()> {
        self.record_operation(Operation::ResizeExt4 {
            device: device.to_path_buf(),
            size: size.map(String::from),
        });
        Ok(())
    }
}

impl FormatOps for FakeHal {
    fn format_ext4(&self, device: &Path, opts: &FormatOptions) -> HalResult<()> {
        if !opts.dry_run && !opts.confirmed {
            return Err(HalError::SafetyLock);
        }

        if opts.dry_run {
            log::info!("FAKE HAL DRY RUN: mkfs.ext4 {}", device.display());
            return Ok(());
        }

        self.record_operation(Operation::FormatExt4 {
            device: device.to_path_buf(),
        });

        Ok(())
    }
}

impl ProbeOps for FakeHal {
    fn lsblk_size_bytes(&self, disk: &Path) -> HalResult<u64> {
        self.record_operation(Operation::LsblkSize {
            disk: disk.to_path_buf(),
        });
        Ok(self.state.lock().unwrap().disk_size_bytes)
    }

    fn lsblk_mountpoints(&self, disk: &Path) -> HalResult<Vec<PathBuf>> {
        self.record_operation(Operation::LsblkMountpoints {
            disk: disk.to_path_buf(),
        });
        Ok(self.state.lock().unwrap().mountpoints.clone())
    }

    fn lsblk_table(&self, disk: &Path) -> HalResult<String> {
        self.record_operation(Operation::LsblkTable {
            disk: disk.to_path_buf(),
        });
        Ok(String::new())
    }

    fn blkid_uuid(&self, device: &Path) -> HalResult<String> {
        self.record_operation(Operation::BlkidUuid {
            device: device.to_path_buf(),
        });
        Ok("FAKE-UUID".to_string())
    }
}

impl SystemOps for FakeHal {
    fn sync(&self) -> HalResult<()> {
        self.record_operation(Operation::Sync);
        Ok(())
    }

    fn partprobe(&self, disk: &Path) -> HalResult<()> {
        self.record_operation(Operation::Partprobe {
            disk: disk.to_path_buf(),
        });
        Ok(())
    }

    fn udev_settle(&self) -> HalResult<()> {
        self.record_operation(Operation::UdevSettle);
        Ok(())
    }
}

impl MountOps for FakeHal {
    fn mount_device(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        _options: MountOptions,
        dry_run: bool,
    ) -> HalResult<()> {
        if dry_run {
            log::info!(
                "FAKE HAL DRY RUN: mount {} -> {}",
                device.display(),
                target.display()
            );
            return Ok(());
        }

        self.record_operation(Operation::Mount {
            device: device.to_path_buf(),
            target: target.to_path_buf(),
            fstype: fstype.map(String::from),
        });
        self.state
            .lock()
            .unwrap()
            .mounted_paths
            .insert(target.to_path_buf());

        Ok(())
    }

    fn unmount(&self, target: &Path, dry_run: bool) -> HalResult<()> {
        if dry_run {
            log::info!("FAKE HAL DRY RUN: unmount {}", target.display());
            return Ok(());
        }

        self.record_operation(Operation::Unmount {
            target: target.to_path_buf(),
        });
        self.state.lock().unwrap().mounted_paths.remove(target);

        Ok(())
    }

    fn is_mounted(&self, path: &Path) -> HalResult<bool> {
        Ok(self.state.lock().unwrap().mounted_paths.contains(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_hal_records_flash() {
        let hal = FakeHal::new();
        let image = Path::new("/tmp/image.img");
        let target = Path::new("/dev/sda");

        let opts = FlashOptions::new(false, true);
        hal.flash_raw_image(image, target, &opts, &mut |_, _| {})
            .unwrap();

        assert_eq!(hal.operation_count(), 1);
        assert!(hal.has_operation(|op| matches!(op, Operation::FlashImage { .. })));
    }

    #[test]
    fn fake_hal_requires_confirmation() {
        let hal = FakeHal::new();

        let opts = FormatOptions::new(false, false);
        let err = hal.format_ext4(Path::new("/dev/sda1"), &opts).unwrap_err();
        assert!(matches!(err, HalError::SafetyLock));

        let flash_opts = FlashOptions::new(false, false);
        let err = hal
            .flash_raw_image(
                Path::new("/tmp/image.img"),
                Path::new("/dev/sda"),
                &flash_opts,
                &mut |_, _| {},
            )
            .unwrap_err();
        assert!(matches!(err, HalError::SafetyLock));

        let parted_opts = PartedOptions::new(false, false);
        let err = hal
            .parted(
                Path::new("/dev/sda"),
                PartedOp::MkLabel {
                    label: "msdos".to_string(),
                },
                &parted_opts,
            )
            .unwrap_err();
        assert!(matches!(err, HalError::SafetyLock));
    }

    #[test]
    fn fake_hal_parted_print_returns_canned_output() {
        let hal = FakeHal::new();
        hal.set_parted_print("BYT;\n");

        let opts = PartedOptions::new(false, false);
        let out = hal
            .parted(Path::new("/dev/sda"), PartedOp::Print, &opts)
            .unwrap();
        assert_eq!(out, "BYT;\n");
    }

    #[test]
    fn fake_hal_tracks_mounts() {
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

        hal.unmount(target, false).unwrap();
        assert!(!hal.is_mounted(target).unwrap());
    }

    #[test]
    fn fake_hal_can_clear() {
        let hal = FakeHal::new();
        hal.sync().unwrap();
        assert_eq!(hal.operation_count(), 1);

        hal.clear();
        assert_eq!(hal.operation_count(), 0);
    }
}
