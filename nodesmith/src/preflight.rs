//! Preflight checks: required OS utilities and privileges.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Utilities the partition manager shells out to.
pub const PARTITION_TOOLS: &[&str] = &[
    "parted",
    "e2fsck",
    "resize2fs",
    "mkfs.ext4",
    "blkid",
    "partprobe",
    "lsblk",
    "udevadm",
];

/// Utilities the config generator shells out to.
pub const CONFIG_TOOLS: &[&str] = &["openssl", "lsblk", "blkid"];

#[derive(Debug, Clone)]
pub struct PreflightConfig {
    pub required_binaries: Vec<String>,
    pub path_env: String,
    pub require_root: bool,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        let path_env = std::env::var("PATH").unwrap_or_default();
        Self {
            required_binaries: PARTITION_TOOLS.iter().map(|s| s.to_string()).collect(),
            path_env,
            require_root: true,
        }
    }
}

impl PreflightConfig {
    pub fn for_tools(tools: &[&str]) -> Self {
        Self {
            required_binaries: tools.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }
}

pub fn run(cfg: &PreflightConfig) -> Result<()> {
    log::info!("Preflight checks");

    if cfg.require_root {
        check_root()?;
    }
    check_binaries(cfg)?;

    log::info!("Preflight complete");
    Ok(())
}

fn check_root() -> Result<()> {
    if !nix::unistd::geteuid().is_root() {
        bail!("This operation needs root privileges (try sudo, or the `run` container wrapper)");
    }
    Ok(())
}

fn check_binaries(cfg: &PreflightConfig) -> Result<()> {
    let mut missing = Vec::new();
    for binary in &cfg.required_binaries {
        match find_in_path(binary, &cfg.path_env) {
            Some(path) => log::debug!("found {} at {}", binary, path.display()),
            None => missing.push(binary.clone()),
        }
    }
    if !missing.is_empty() {
        bail!("Missing required utilities: {}", missing.join(", "));
    }
    Ok(())
}

/// Locate an executable on a PATH-style search string.
pub fn find_in_path(name: &str, path_env: &str) -> Option<PathBuf> {
    for dir in path_env.split(':').filter(|d| !d.is_empty()) {
        let candidate = Path::new(dir).join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn fake_tool(dir: &Path, name: &str) {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    #[test]
    fn finds_executables_on_search_path() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), "parted");

        let found = find_in_path("parted", &dir.path().display().to_string());
        assert_eq!(found, Some(dir.path().join("parted")));
        assert_eq!(find_in_path("missing-tool", &dir.path().display().to_string()), None);
    }

    #[test]
    fn non_executable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parted");
        std::fs::write(&path, "not a program").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o644);
        std::fs::set_permissions(&path, perms).unwrap();

        assert_eq!(find_in_path("parted", &dir.path().display().to_string()), None);
    }

    #[test]
    fn missing_binaries_fail_preflight() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), "parted");

        let cfg = PreflightConfig {
            required_binaries: vec!["parted".to_string(), "resize2fs".to_string()],
            path_env: dir.path().display().to_string(),
            require_root: false,
        };
        let err = run(&cfg).unwrap_err();
        assert!(err.to_string().contains("resize2fs"));
    }

    #[test]
    fn all_binaries_present_passes() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), "parted");
        fake_tool(dir.path(), "lsblk");

        let cfg = PreflightConfig {
            required_binaries: vec!["parted".to_string(), "lsblk".to_string()],
            path_env: dir.path().display().to_string(),
            require_root: false,
        };
        run(&cfg).unwrap();
    }
}
