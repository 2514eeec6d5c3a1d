use thiserror::Error;

/// Result type alias for nodesmith operations
pub type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum NodesmithError {
    #[error("Device {0} has mounted partitions. Unmount them and retry.")]
    DeviceBusy(String),

    #[error("Size precondition failed: {0}")]
    SizePrecondition(String),

    #[error("Operation aborted by user")]
    Aborted,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("A previous run against {0} was interrupted. Pass --resume to continue it or --force to start over.")]
    InterruptedRun(String),
}
