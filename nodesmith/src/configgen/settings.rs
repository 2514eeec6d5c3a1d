//! Cluster configuration file (TOML) loading.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

/// An IPv4 network in CIDR notation, e.g. `192.168.40.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    pub base: Ipv4Addr,
    pub prefix: u8,
}

impl Ipv4Cidr {
    /// Address at `index` within the network (0 is the network address).
    pub fn host(&self, index: u32) -> Result<Ipv4Addr> {
        let size = 1u64 << (32 - self.prefix);
        if u64::from(index) >= size {
            bail!("host index {} is outside {}", index, self);
        }
        Ok(Ipv4Addr::from(u32::from(self.base) + index))
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| anyhow!("expected CIDR notation (a.b.c.d/len), got {:?}", s))?;
        let base: Ipv4Addr = addr
            .parse()
            .map_err(|e| anyhow!("bad network address {:?}: {}", addr, e))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|e| anyhow!("bad prefix length {:?}: {}", prefix, e))?;
        if prefix > 32 {
            bail!("prefix length {} is out of range", prefix);
        }
        let mask = if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix)
        };
        if u32::from(base) & !mask != 0 {
            bail!("{} has host bits set", s);
        }
        Ok(Self { base, prefix })
    }
}

impl<'de> Deserialize<'de> for Ipv4Cidr {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub cluster: ClusterSettings,
    pub network: NetworkSettings,
    pub accounts: AccountSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSettings {
    /// Host naming pattern; `{num}` is replaced with the zero-padded index.
    pub hostname_pattern: String,
    pub domain: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Device path of the data partition as seen from the booted node.
    #[serde(default = "default_data_partition")]
    pub data_partition: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSettings {
    pub gateway: Ipv4Addr,
    pub eth_network: Option<Ipv4Cidr>,
    pub wifi_network: Option<Ipv4Cidr>,
    #[serde(default)]
    pub eth_dhcp: bool,
    #[serde(default)]
    pub wifi_dhcp: bool,
    pub wifi_ssid: Option<String>,
    pub wifi_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountSettings {
    pub remote_admin_username: String,
    pub remote_admin_ssh_key: String,
    pub local_admin_username: String,
    pub local_admin_password: Option<String>,
    /// Pre-hashed password; takes precedence over `local_admin_password`.
    pub local_admin_password_hash: Option<String>,
    /// Fixed salt so repeated renders stay byte-identical.
    #[serde(default = "default_salt")]
    pub password_salt: String,
}

fn default_timezone() -> String {
    "Etc/UTC".to_string()
}

fn default_data_partition() -> String {
    "/dev/mmcblk0p3".to_string()
}

fn default_salt() -> String {
    "nodesmith".to_string()
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Malformed configuration file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_parses_and_indexes() {
        let net: Ipv4Cidr = "192.168.40.0/24".parse().unwrap();
        assert_eq!(net.host(0).unwrap(), Ipv4Addr::new(192, 168, 40, 0));
        assert_eq!(net.host(5).unwrap(), Ipv4Addr::new(192, 168, 40, 5));
        assert!(net.host(256).is_err());
    }

    #[test]
    fn cidr_rejects_host_bits_and_bad_prefix() {
        assert!("192.168.40.1/24".parse::<Ipv4Cidr>().is_err());
        assert!("192.168.40.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("192.168.40.0".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn settings_parse_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[cluster]
hostname_pattern = "k8s-node-{num}"
domain = "cluster.example.net"

[network]
gateway = "192.168.40.1"
eth_network = "192.168.40.0/24"

[accounts]
remote_admin_username = "ops"
remote_admin_ssh_key = "ssh-ed25519 AAAA ops@bastion"
local_admin_username = "pi"
local_admin_password_hash = "$6$nodesmith$abcdef"
"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.cluster.hostname_pattern, "k8s-node-{num}");
        assert_eq!(settings.cluster.timezone, "Etc/UTC");
        assert_eq!(settings.cluster.data_partition, "/dev/mmcblk0p3");
        assert_eq!(
            settings.network.eth_network.unwrap().base,
            Ipv4Addr::new(192, 168, 40, 0)
        );
        assert!(settings.network.wifi_network.is_none());
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cluster]\nhostname_pattern = \"x\"\n").unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
