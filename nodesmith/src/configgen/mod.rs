//! Config generator: render per-host cloud-init documents and optionally
//! install them onto a device's boot partition.

pub mod render;
pub mod settings;

use crate::confirm::Prompter;
use crate::device;
use crate::errors::NodesmithError;
use anyhow::{Context, Result};
use nodesmith_hal::{MountGuard, MountOptions, NodeHal};
use render::{IfaceStanza, WifiStanza};
use settings::Settings;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ConfigGenOptions {
    pub device: PathBuf,
    pub config_path: PathBuf,
    pub output_dir: PathBuf,
    pub hosts_number: u32,
    pub offset: u32,
    pub setup_eth: bool,
    pub setup_wifi: bool,
    pub force: bool,
    pub skip_install: bool,
    /// Where the boot partition gets mounted during install.
    pub mount_dir: PathBuf,
}

impl ConfigGenOptions {
    pub fn from_args(args: &crate::cli::ConfigGenArgs) -> Self {
        Self {
            device: args.device.clone(),
            config_path: args.config.clone(),
            output_dir: args.output_dir.clone(),
            hosts_number: args.hosts_number,
            offset: args.offset,
            setup_eth: args.eth_enabled(),
            setup_wifi: args.wifi_enabled(),
            force: args.force,
            skip_install: args.skip_install,
            mount_dir: PathBuf::from("/mnt/nodesmith-boot"),
        }
    }
}

/// Render the configured host range and, for a single-host run, install the
/// result onto the device's boot partition.
pub fn run<H: NodeHal>(hal: &H, prompter: &dyn Prompter, opts: &ConfigGenOptions) -> Result<()> {
    if !opts.setup_eth && !opts.setup_wifi {
        return Err(NodesmithError::Config(
            "need to set up either the ethernet or the WiFi network".to_string(),
        )
        .into());
    }

    let settings = Settings::load(&opts.config_path)?;
    validate_network(&settings, opts)?;

    let password_hash = render::password_hash(hal, &settings.accounts)?;

    let mut last_host_dir = None;
    for index in (opts.offset + 1)..=(opts.offset + opts.hosts_number) {
        let hostname = render::hostname_for(&settings.cluster.hostname_pattern, index);
        log::info!("Working on host: {}", hostname);

        let host_dir = opts.output_dir.join(&hostname);
        if host_dir.exists() && !opts.force {
            let ok = prompter.confirm(&format!(
                "Configuration for {} already exists under {}. Overwrite?",
                hostname,
                host_dir.display()
            ))?;
            if !ok {
                return Err(NodesmithError::Aborted.into());
            }
        }
        fs::create_dir_all(&host_dir).with_context(|| {
            format!("Failed to create output directory: {}", host_dir.display())
        })?;

        let user_data = render::render_user_data(&settings, &hostname, &password_hash)?;
        let network_config = render_host_network(&settings, opts, index)?;

        println!("{}", user_data);
        println!("{}", network_config);

        fs::write(host_dir.join("user-data"), &user_data)?;
        fs::write(host_dir.join("network-config"), &network_config)?;

        last_host_dir = Some(host_dir);
    }
    log::info!("Finished generating cloud-init configuration.");

    if opts.skip_install {
        return Ok(());
    }
    let Some(host_dir) = last_host_dir else {
        return Ok(());
    };
    if opts.hosts_number != 1 {
        log::warn!(
            "Generated configuration for {} hosts; a boot partition holds exactly one. Skipping install.",
            opts.hosts_number
        );
        return Ok(());
    }

    install(hal, prompter, opts, &host_dir)
}

fn validate_network(settings: &Settings, opts: &ConfigGenOptions) -> Result<()> {
    let net = &settings.network;
    if opts.setup_eth && !net.eth_dhcp && net.eth_network.is_none() {
        return Err(NodesmithError::Config(
            "eth_network must be set for a static ethernet interface".to_string(),
        )
        .into());
    }
    if opts.setup_wifi {
        if !net.wifi_dhcp && net.wifi_network.is_none() {
            return Err(NodesmithError::Config(
                "wifi_network must be set for a static WiFi interface".to_string(),
            )
            .into());
        }
        if net.wifi_ssid.is_none() || net.wifi_password.is_none() {
            return Err(NodesmithError::Config(
                "wifi_ssid and wifi_password must be set when WiFi is enabled".to_string(),
            )
            .into());
        }
    }
    Ok(())
}

fn render_host_network(settings: &Settings, opts: &ConfigGenOptions, index: u32) -> Result<String> {
    let net = &settings.network;

    let eth = if opts.setup_eth {
        Some(if net.eth_dhcp {
            IfaceStanza {
                dhcp: true,
                address: None,
                prefix: None,
            }
        } else {
            // Presence checked in validate_network.
            let network = net
                .eth_network
                .ok_or_else(|| NodesmithError::Config("eth_network missing".to_string()))?;
            IfaceStanza {
                dhcp: false,
                address: Some(network.host(index - 1)?.to_string()),
                prefix: Some(network.prefix),
            }
        })
    } else {
        None
    };

    let wifi = if opts.setup_wifi {
        let ssid = net
            .wifi_ssid
            .clone()
            .ok_or_else(|| NodesmithError::Config("wifi_ssid missing".to_string()))?;
        let password = net
            .wifi_password
            .clone()
            .ok_or_else(|| NodesmithError::Config("wifi_password missing".to_string()))?;
        Some(if net.wifi_dhcp {
            WifiStanza {
                dhcp: true,
                address: None,
                prefix: None,
                ssid,
                password,
            }
        } else {
            let network = net
                .wifi_network
                .ok_or_else(|| NodesmithError::Config("wifi_network missing".to_string()))?;
            WifiStanza {
                dhcp: false,
                address: Some(network.host(index - 1)?.to_string()),
                prefix: Some(network.prefix),
                ssid,
                password,
            }
        })
    } else {
        None
    };

    render::render_network_config(&net.gateway, eth.as_ref(), wifi.as_ref())
}

fn install<H: NodeHal>(
    hal: &H,
    prompter: &dyn Prompter,
    opts: &ConfigGenOptions,
    host_dir: &Path,
) -> Result<()> {
    if !opts.force {
        let ok = prompter.confirm(&format!(
            "Copy the cloud-init configuration onto the boot partition of {}?",
            opts.device.display()
        ))?;
        if !ok {
            log::info!("Skipping boot partition install.");
            return Ok(());
        }
    }

    let boot_part = device::partition_path(&opts.device, 1);
    fs::create_dir_all(&opts.mount_dir).with_context(|| {
        format!("Failed to create mount point: {}", opts.mount_dir.display())
    })?;
    hal.mount_device(
        &boot_part,
        &opts.mount_dir,
        Some("vfat"),
        MountOptions::new(),
        false,
    )?;
    let guard = MountGuard::new(hal, opts.mount_dir.clone(), false);
    let target = guard.target().to_path_buf();

    let existing = target.join("user-data");
    if existing.exists() && !opts.force {
        let ok = prompter.confirm(
            "A user-data file already exists on the boot partition. Replace it?",
        )?;
        if !ok {
            return Err(NodesmithError::Aborted.into());
        }
    }

    log::info!("Copying user-data to the boot partition");
    fs::copy(host_dir.join("user-data"), target.join("user-data"))?;
    log::info!("Copying network-config to the boot partition");
    fs::copy(host_dir.join("network-config"), target.join("network-config"))?;
    log::info!("Copying cmdline.txt (enables cgroups)");
    fs::write(target.join("cmdline.txt"), render::CMDLINE_TXT)?;
    log::info!("Copying config.txt");
    fs::write(target.join("config.txt"), render::CONFIG_TXT)?;

    hal.sync()?;
    drop(guard);
    log::info!("Finished copying cloud-init configuration.");
    Ok(())
}
