//! CLI argument parsing for nodesmith.
//!
//! Each subcommand parses into an immutable args struct that is passed by
//! value into the matching manager; nothing here mutates global state.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nodesmith")]
#[command(version, about = "Provision Raspberry Pi boards as Kubernetes cluster nodes")]
#[command(long_about = "Provision Raspberry Pi boards as Kubernetes cluster nodes.\n\n\
    Two operations are provided: flashing an OS image onto a device while\n\
    carving out a trailing data partition, and rendering per-host cloud-init\n\
    configuration. The `run` subcommand wraps either operation in a\n\
    privileged container so the host only needs a container runtime.")]
pub struct Cli {
    /// Show the full output of every invoked OS utility
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Flash an OS image to a device and create a trailing data partition
    PartitionManager(PartitionArgs),

    /// Render per-host cloud-init config and install it onto a boot partition
    ConfigGenerator(ConfigGenArgs),

    /// Run an operation inside a privileged container with the device passed through
    Run(RunArgs),

    /// Verify required OS utilities and privileges
    Preflight,
}

#[derive(Args, Clone, Debug)]
pub struct PartitionArgs {
    /// Target block device (e.g. /dev/sdb). All data on it will be destroyed.
    pub device: PathBuf,

    /// Size for the system partition in GiB
    #[arg(long)]
    pub system_size: Option<u64>,

    /// Path of the image to write
    #[arg(long, default_value = "./image.img")]
    pub image_path: PathBuf,

    /// Skip interactive confirmation before destructive writes
    #[arg(short, long)]
    pub force: bool,

    /// Continue an interrupted run, skipping steps that already completed
    #[arg(long)]
    pub resume: bool,
}

#[derive(Args, Clone, Debug)]
pub struct ConfigGenArgs {
    /// Device whose boot partition receives the rendered configuration
    pub device: PathBuf,

    /// How many sequential hosts to generate configuration for
    #[arg(long, default_value_t = 4)]
    pub hosts_number: u32,

    /// Host index offset (e.g. 3 if config for 3 hosts already exists)
    #[arg(long, default_value_t = 0)]
    pub offset: u32,

    /// Generate a stanza for the ethernet interface (default)
    #[arg(long, overrides_with = "no_setup_eth")]
    pub setup_eth: bool,

    /// Do not generate an ethernet stanza
    #[arg(long)]
    pub no_setup_eth: bool,

    /// Generate a stanza for the WiFi interface
    #[arg(long, overrides_with = "no_setup_wifi")]
    pub setup_wifi: bool,

    /// Do not generate a WiFi stanza (default)
    #[arg(long)]
    pub no_setup_wifi: bool,

    /// Path to the cluster configuration file
    #[arg(long, default_value = "./config.toml")]
    pub config: PathBuf,

    /// Directory the rendered documents are written under
    #[arg(long, default_value = "./output/cloud-init")]
    pub output_dir: PathBuf,

    /// Render only; do not copy anything onto the boot partition
    #[arg(long)]
    pub skip_install: bool,

    /// Overwrite existing rendered or installed configuration without asking
    #[arg(short, long)]
    pub force: bool,
}

impl ConfigGenArgs {
    pub fn eth_enabled(&self) -> bool {
        if self.setup_eth {
            true
        } else {
            !self.no_setup_eth
        }
    }

    pub fn wifi_enabled(&self) -> bool {
        if self.no_setup_wifi {
            false
        } else {
            self.setup_wifi
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Container runtime binary (auto-detects podman, then docker, when omitted)
    #[arg(long)]
    pub runtime: Option<String>,

    /// Container image that packages the toolkit
    #[arg(long, default_value = "nodesmith:latest")]
    pub container_image: String,

    #[command(subcommand)]
    pub tool: Tool,
}

/// The operation forwarded into the container.
#[derive(Subcommand, Clone, Debug)]
pub enum Tool {
    /// Flash an OS image to a device and create a trailing data partition
    PartitionManager(PartitionArgs),

    /// Render per-host cloud-init config and install it onto a boot partition
    ConfigGenerator(ConfigGenArgs),
}

impl Tool {
    pub fn device(&self) -> &PathBuf {
        match self {
            Tool::PartitionManager(args) => &args.device,
            Tool::ConfigGenerator(args) => &args.device,
        }
    }
}
