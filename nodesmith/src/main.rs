use clap::error::ErrorKind;
use clap::Parser;
use nodesmith::cli::{Cli, Command};
use nodesmith::confirm::DialoguerPrompter;
use nodesmith::{configgen, container, logging, partition, preflight};
use nodesmith_hal::LinuxHal;
use std::process;

fn main() {
    // clap's own exit codes don't match the dispatcher contract (usage errors
    // must exit 1, help must exit 0), so parse manually.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            process::exit(code);
        }
    };

    logging::init(cli.debug);

    match dispatch(&cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            process::exit(1);
        }
    }
}

fn dispatch(cli: &Cli) -> anyhow::Result<i32> {
    let hal = LinuxHal::new();
    let prompter = DialoguerPrompter;

    match &cli.command {
        Command::PartitionManager(args) => {
            preflight::run(&preflight::PreflightConfig::default())?;
            let opts = partition::PartitionOptions::from_args(args);
            partition::run(&hal, &prompter, &opts)?;
            Ok(0)
        }
        Command::ConfigGenerator(args) => {
            let mut cfg = preflight::PreflightConfig::for_tools(preflight::CONFIG_TOOLS);
            // Rendering alone needs no privileges; mounting the boot partition does.
            cfg.require_root = !args.skip_install;
            preflight::run(&cfg)?;

            let opts = configgen::ConfigGenOptions::from_args(args);
            configgen::run(&hal, &prompter, &opts)?;
            Ok(0)
        }
        Command::Run(args) => container::run(&hal, args, cli.debug),
        Command::Preflight => {
            preflight::run(&preflight::PreflightConfig::default())?;
            Ok(0)
        }
    }
}
