//! nodesmith: provision Raspberry Pi boards as Kubernetes cluster nodes.
//!
//! The toolkit wraps two operations behind one binary: flashing an OS image
//! onto a block device while carving out a trailing data partition, and
//! rendering per-host cloud-init configuration. A third subcommand runs
//! either operation inside a privileged container so the host machine only
//! needs a container runtime.

pub mod cli;
pub mod configgen;
pub mod confirm;
pub mod container;
pub mod device;
pub mod errors;
pub mod logging;
pub mod partition;
pub mod preflight;
