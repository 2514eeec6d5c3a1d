//! HAL trait definitions and implementations.
//!
//! This module defines the core traits for system operations and provides
//! both real (LinuxHal) and fake (FakeHal) implementations.

pub mod fake_hal;
pub mod flash_ops;
pub mod format_ops;
pub mod fs_ops;
pub mod guards;
pub mod linux_hal;
pub mod mount_ops;
pub mod partition_ops;
pub mod probe_ops;
pub mod process_ops;
pub mod system_ops;

pub use fake_hal::{FakeHal, Operation};
pub use flash_ops::{FlashOps, FlashOptions};
pub use format_ops::{FormatOps, FormatOptions};
pub use fs_ops::FsOps;
pub use guards::MountGuard;
pub use linux_hal::LinuxHal;
pub use mount_ops::{MountOps, MountOptions};
pub use partition_ops::{PartedOp, PartedOptions, PartitionOps};
pub use probe_ops::ProbeOps;
pub use process_ops::ProcessOps;
pub use system_ops::SystemOps;

/// Complete HAL combining all system operation traits.
pub trait NodeHal:
    ProcessOps
    + FlashOps
    + PartitionOps
    + FsOps
    + FormatOps
    + ProbeOps
    + MountOps
    + SystemOps
    + Send
    + Sync
{
}

/// Automatically implement NodeHal for any type implementing all required traits.
impl<T> NodeHal for T where
    T: ProcessOps
        + FlashOps
        + PartitionOps
        + FsOps
        + FormatOps
        + ProbeOps
        + MountOps
        + SystemOps
        + Send
        + Sync
{
}
