//! Template rendering for the cloud-init documents.
//!
//! Rendering is a pure substitution: identical settings, offset and
//! interface flags always produce byte-identical output. The password hash
//! uses a fixed salt from the configuration for the same reason.

use super::settings::{AccountSettings, Settings};
use crate::errors::NodesmithError;
use anyhow::{bail, Result};
use minijinja::{context, Environment};
use nodesmith_hal::ProcessOps;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::time::Duration;

static TEMPLATES: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    env.add_template("user-data", include_str!("../../templates/user-data.j2"))
        .expect("user-data template is valid");
    env.add_template(
        "network-config",
        include_str!("../../templates/network-config.j2"),
    )
    .expect("network-config template is valid");
    env
});

/// Boot-partition payloads installed verbatim alongside the rendered config.
pub const CMDLINE_TXT: &str = include_str!("../../templates/cmdline.txt");
pub const CONFIG_TXT: &str = include_str!("../../templates/config.txt");

/// Derive a hostname from the configured pattern and a host index.
///
/// `{num}` in the pattern is replaced with the zero-padded index.
pub fn hostname_for(pattern: &str, index: u32) -> String {
    pattern.replace("{num}", &format!("{:02}", index))
}

/// One interface stanza of the network-config document.
#[derive(Debug, Clone, Serialize)]
pub struct IfaceStanza {
    pub dhcp: bool,
    pub address: Option<String>,
    pub prefix: Option<u8>,
}

/// The WiFi stanza additionally carries the access point credentials.
#[derive(Debug, Clone, Serialize)]
pub struct WifiStanza {
    pub dhcp: bool,
    pub address: Option<String>,
    pub prefix: Option<u8>,
    pub ssid: String,
    pub password: String,
}

pub fn render_user_data(
    settings: &Settings,
    hostname: &str,
    password_hash: &str,
) -> Result<String> {
    let template = TEMPLATES.get_template("user-data")?;
    let rendered = template.render(context! {
        hostname => hostname,
        domain => settings.cluster.domain,
        timezone => settings.cluster.timezone,
        data_partition => settings.cluster.data_partition,
        remote_admin_username => settings.accounts.remote_admin_username,
        remote_admin_ssh_key => settings.accounts.remote_admin_ssh_key,
        local_admin_username => settings.accounts.local_admin_username,
        local_admin_password_hash => password_hash,
    })?;
    Ok(rendered)
}

pub fn render_network_config(
    gateway: &Ipv4Addr,
    eth: Option<&IfaceStanza>,
    wifi: Option<&WifiStanza>,
) -> Result<String> {
    let template = TEMPLATES.get_template("network-config")?;
    let rendered = template.render(context! {
        gateway => gateway.to_string(),
        eth => eth,
        wifi => wifi,
    })?;
    Ok(rendered)
}

/// Resolve the local admin password hash.
///
/// A pre-hashed value from the configuration wins; otherwise the plaintext
/// password is hashed with `openssl passwd -6` and the configured fixed salt,
/// fed over stdin so it never appears in a process list.
pub fn password_hash(hal: &dyn ProcessOps, accounts: &AccountSettings) -> Result<String> {
    if let Some(hash) = &accounts.local_admin_password_hash {
        return Ok(hash.clone());
    }

    let Some(password) = &accounts.local_admin_password else {
        return Err(NodesmithError::Config(
            "either local_admin_password or local_admin_password_hash must be set".to_string(),
        )
        .into());
    };

    let output = hal.command_output_with_stdin(
        "openssl",
        &["passwd", "-6", "-salt", &accounts.password_salt, "-stdin"],
        password.as_bytes(),
        Duration::from_secs(10),
    )?;
    if !output.status.success() {
        bail!(
            "openssl passwd failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !hash.starts_with("$6$") {
        bail!("openssl passwd did not produce a SHA-512 crypt hash");
    }
    Ok(hash)
}
