//! nodesmith system-operation abstraction layer.
//!
//! Every operation that touches the world (spawning an external utility,
//! writing an image to a block device, mounting a partition) goes through
//! the traits in this crate so the provisioning workflows can be exercised
//! in CI without root privileges or real hardware.

mod error;
pub mod hal;

pub use error::{HalError, HalResult};
pub use hal::{
    FakeHal, FlashOps, FlashOptions, FormatOps, FormatOptions, FsOps, LinuxHal, MountGuard,
    MountOps, MountOptions, NodeHal, Operation, PartedOp, PartedOptions, PartitionOps, ProbeOps,
    ProcessOps, SystemOps,
};
