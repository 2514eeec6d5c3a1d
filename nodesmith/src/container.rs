//! Container invocation builder.
//!
//! Translates a validated subcommand into a single container-run argument
//! vector: the working directory is bind-mounted so generated files land on
//! the host, and exactly the one target device node is passed through. The
//! composed command is echoed before execution and the child's exit code is
//! propagated unchanged.

use crate::cli::{RunArgs, Tool};
use crate::preflight::find_in_path;
use anyhow::{bail, Result};
use nodesmith_hal::ProcessOps;
use std::path::Path;

/// A fully composed container command, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl ContainerInvocation {
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Pick the first available container runtime.
pub fn detect_runtime(path_env: &str) -> Result<String> {
    for candidate in ["podman", "docker"] {
        if find_in_path(candidate, path_env).is_some() {
            return Ok(candidate.to_string());
        }
    }
    bail!("No container runtime found (looked for podman, docker)");
}

/// Rebuild the argument vector forwarded to the tool inside the container.
///
/// Values are emitted explicitly from the parsed args, so the echoed command
/// is an exact record of what will run inside the container.
pub fn forwarded_args(tool: &Tool, debug: bool) -> Vec<String> {
    let mut args = Vec::new();
    match tool {
        Tool::PartitionManager(p) => {
            args.push("partition-manager".to_string());
            args.push(p.device.display().to_string());
            if let Some(size) = p.system_size {
                args.push("--system-size".to_string());
                args.push(size.to_string());
            }
            args.push("--image-path".to_string());
            args.push(p.image_path.display().to_string());
            if p.force {
                args.push("--force".to_string());
            }
            if p.resume {
                args.push("--resume".to_string());
            }
        }
        Tool::ConfigGenerator(c) => {
            args.push("config-generator".to_string());
            args.push(c.device.display().to_string());
            args.push("--hosts-number".to_string());
            args.push(c.hosts_number.to_string());
            args.push("--offset".to_string());
            args.push(c.offset.to_string());
            if !c.eth_enabled() {
                args.push("--no-setup-eth".to_string());
            }
            if c.wifi_enabled() {
                args.push("--setup-wifi".to_string());
            }
            args.push("--config".to_string());
            args.push(c.config.display().to_string());
            args.push("--output-dir".to_string());
            args.push(c.output_dir.display().to_string());
            if c.skip_install {
                args.push("--skip-install".to_string());
            }
            if c.force {
                args.push("--force".to_string());
            }
        }
    }
    if debug {
        args.push("--debug".to_string());
    }
    args
}

/// Compose the full container-run invocation.
pub fn build_invocation(
    runtime: &str,
    image: &str,
    workdir: &Path,
    tool: &Tool,
    debug: bool,
) -> ContainerInvocation {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "-it".to_string(),
        "--privileged".to_string(),
        "--device".to_string(),
        tool.device().display().to_string(),
        "-v".to_string(),
        format!("{}:/work", workdir.display()),
        "-w".to_string(),
        "/work".to_string(),
        image.to_string(),
    ];
    args.extend(forwarded_args(tool, debug));

    ContainerInvocation {
        program: runtime.to_string(),
        args,
    }
}

/// Execute the wrapper: detect the runtime, compose the command, echo it,
/// run it synchronously with inherited stdio, and return the exit code.
pub fn run(hal: &dyn ProcessOps, args: &RunArgs, debug: bool) -> Result<i32> {
    let path_env = std::env::var("PATH").unwrap_or_default();
    let runtime = match &args.runtime {
        Some(runtime) => runtime.clone(),
        None => detect_runtime(&path_env)?,
    };

    let workdir = std::env::current_dir()?;
    let invocation = build_invocation(&runtime, &args.container_image, &workdir, &args.tool, debug);

    println!("Running: {}", invocation.command_line());

    let argv: Vec<&str> = invocation.args.iter().map(String::as_str).collect();
    let code = hal.command_interactive(&invocation.program, &argv)?;
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    fn parse_tool(argv: &[&str]) -> (Tool, bool) {
        let cli = Cli::parse_from(argv);
        let debug = cli.debug;
        match cli.command {
            Command::Run(run) => (run.tool, debug),
            _ => panic!("expected run subcommand"),
        }
    }

    #[test]
    fn partition_manager_invocation_matches_flags() {
        let (tool, debug) = parse_tool(&[
            "nodesmith",
            "run",
            "partition-manager",
            "/dev/sdb",
            "--image-path",
            "./image.img",
            "--force",
        ]);

        let invocation =
            build_invocation("podman", "nodesmith:latest", Path::new("/home/op"), &tool, debug);

        assert_eq!(invocation.program, "podman");
        assert_eq!(
            invocation.args,
            vec![
                "run",
                "--rm",
                "-it",
                "--privileged",
                "--device",
                "/dev/sdb",
                "-v",
                "/home/op:/work",
                "-w",
                "/work",
                "nodesmith:latest",
                "partition-manager",
                "/dev/sdb",
                "--image-path",
                "./image.img",
                "--force",
            ]
        );
    }

    #[test]
    fn config_generator_forwarding_preserves_interface_flags() {
        let (tool, debug) = parse_tool(&[
            "nodesmith",
            "run",
            "config-generator",
            "/dev/sdb",
            "--no-setup-eth",
            "--setup-wifi",
            "--hosts-number",
            "1",
            "--offset",
            "5",
        ]);

        let args = forwarded_args(&tool, debug);
        assert!(args.contains(&"--no-setup-eth".to_string()));
        assert!(args.contains(&"--setup-wifi".to_string()));
        assert!(args.windows(2).any(|w| w == ["--offset", "5"]));
        assert!(args.windows(2).any(|w| w == ["--hosts-number", "1"]));
    }

    #[test]
    fn debug_flag_is_forwarded() {
        let (tool, debug) = parse_tool(&[
            "nodesmith",
            "--debug",
            "run",
            "partition-manager",
            "/dev/sdb",
        ]);
        let args = forwarded_args(&tool, debug);
        assert!(args.contains(&"--debug".to_string()));
    }

    #[test]
    fn detect_runtime_errors_when_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(detect_runtime(&dir.path().display().to_string()).is_err());
    }
}
