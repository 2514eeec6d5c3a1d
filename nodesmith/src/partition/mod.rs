//! Disk/partition manager: write an image to a device, then carve the
//! remaining capacity into a data partition.
//!
//! The sequence is linear and destructive; every completed step is recorded
//! (see [`state`]) so an interrupted run can be resumed instead of repeated.

pub mod state;
pub mod table;

use crate::confirm::Prompter;
use crate::device;
use crate::errors::NodesmithError;
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use nodesmith_hal::{FlashOptions, FormatOptions, NodeHal, PartedOp, PartedOptions};
use state::{FlashState, Step};
use std::fs;
use std::path::{Path, PathBuf};

const GIB: u64 = 1024 * 1024 * 1024;

/// Minimum recommended system partition size in GiB.
const MIN_SYSTEM_SIZE_GIB: u64 = 20;

#[derive(Debug, Clone)]
pub struct PartitionOptions {
    pub device: PathBuf,
    pub image: PathBuf,
    pub system_size_gib: Option<u64>,
    pub force: bool,
    pub resume: bool,
    pub state_dir: PathBuf,
}

impl PartitionOptions {
    pub fn from_args(args: &crate::cli::PartitionArgs) -> Self {
        Self {
            device: args.device.clone(),
            image: args.image_path.clone(),
            system_size_gib: args.system_size,
            force: args.force,
            resume: args.resume,
            state_dir: PathBuf::from("./.nodesmith-state"),
        }
    }
}

struct StepRunner {
    state: FlashState,
    path: PathBuf,
}

impl StepRunner {
    fn run(&mut self, step: Step, f: impl FnOnce() -> Result<()>) -> Result<()> {
        if self.state.is_completed(step) {
            log::info!("Skipping already-completed step: {:?}", step);
            return Ok(());
        }
        f()?;
        self.state.mark_completed(step);
        state::save_state_atomic(&self.path, &self.state)
    }
}

fn check_size_preconditions(capacity_gib: u64, image_len: u64, system_size_gib: u64) -> Result<()> {
    if system_size_gib < MIN_SYSTEM_SIZE_GIB {
        return Err(NodesmithError::SizePrecondition(format!(
            "system partition must be at least {}GiB, got {}GiB",
            MIN_SYSTEM_SIZE_GIB, system_size_gib
        ))
        .into());
    }
    if system_size_gib > capacity_gib {
        return Err(NodesmithError::SizePrecondition(format!(
            "system size ({}GiB) exceeds the disk capacity ({}GiB)",
            system_size_gib, capacity_gib
        ))
        .into());
    }
    if system_size_gib * GIB < image_len {
        return Err(NodesmithError::SizePrecondition(format!(
            "system size ({}GiB) is smaller than the image itself ({} bytes)",
            system_size_gib, image_len
        ))
        .into());
    }
    Ok(())
}

fn check_image(prompter: &dyn Prompter, image: &Path, force: bool) -> Result<u64> {
    let meta = fs::metadata(image)
        .with_context(|| format!("Image not found: {}", image.display()))?;
    if !meta.is_file() {
        bail!("Image path is not a file: {}", image.display());
    }

    let known_suffix = image
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e, "img" | "xz"));
    if !known_suffix {
        if force {
            log::warn!(
                "{} does not look like a disk image, continuing anyway (--force)",
                image.display()
            );
        } else if !prompter.confirm(&format!(
            "File {} does not appear to be a disk image. Are you sure?",
            image.display()
        ))? {
            return Err(NodesmithError::Aborted.into());
        }
    }

    Ok(meta.len())
}

/// Execute the flash-and-partition sequence.
pub fn run<H: NodeHal>(hal: &H, prompter: &dyn Prompter, opts: &PartitionOptions) -> Result<()> {
    device::validate_target(&opts.device)?;
    let image_len = check_image(prompter, &opts.image, opts.force)?;

    log::info!("Refreshing the state of {}", opts.device.display());
    hal.partprobe(&opts.device)?;

    let capacity_bytes = hal.lsblk_size_bytes(&opts.device)?;
    let capacity_gib = capacity_bytes / GIB;
    log::info!(
        "Using device: {} ({}GiB)",
        opts.device.display(),
        capacity_gib
    );

    let state_path = state::state_path(&opts.state_dir, &opts.device);
    let previous = state::load_state(&state_path)?;

    let (run_state, system_size_gib) = if opts.resume {
        match previous {
            Some(prev) if prev.matches(&opts.device, &opts.image) => {
                log::info!(
                    "Resuming interrupted run ({} of 8 steps already done)",
                    prev.completed.len()
                );
                let size = prev.system_size_gib;
                check_size_preconditions(capacity_gib, image_len, size)?;
                (prev, size)
            }
            Some(_) => bail!(
                "Recorded state under {} belongs to a different device/image pair",
                state_path.display()
            ),
            None => bail!(
                "--resume given but no recorded state exists for {}",
                opts.device.display()
            ),
        }
    } else {
        if previous.is_some() && !opts.force {
            return Err(
                NodesmithError::InterruptedRun(opts.device.display().to_string()).into(),
            );
        }

        let size = match opts.system_size_gib {
            Some(size) => size,
            None => {
                let suggested = (capacity_gib / 3).max(100).min(capacity_gib);
                if opts.force {
                    log::info!("Using suggested system partition size: {}GiB", suggested);
                    suggested
                } else {
                    prompter.input_u64("Size for the system partition in GiB", suggested)?
                }
            }
        };

        check_size_preconditions(capacity_gib, image_len, size)?;

        if size > capacity_gib / 2 && !opts.force {
            let ok = prompter.confirm(&format!(
                "The system size might be too large ({}GiB / {}GiB total). Are you sure?",
                size, capacity_gib
            ))?;
            if !ok {
                return Err(NodesmithError::Aborted.into());
            }
        }

        (FlashState::new(&opts.device, &opts.image, size), size)
    };

    // The device must be unmounted before anything destructive happens.
    let mounted = hal.lsblk_mountpoints(&opts.device)?;
    if !mounted.is_empty() {
        if let Ok(table) = hal.lsblk_table(&opts.device) {
            log::info!("Current device layout:\n{}", table.trim_end());
        }
        log::error!(
            "Mounted partitions on {}: {}",
            opts.device.display(),
            mounted
                .iter()
                .map(|m| m.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        return Err(NodesmithError::DeviceBusy(opts.device.display().to_string()).into());
    }

    if !opts.force {
        let ok = prompter.confirm(&format!(
            "About to write {} onto {}, erasing all data on it. Continue?",
            opts.image.display(),
            opts.device.display()
        ))?;
        if !ok {
            return Err(NodesmithError::Aborted.into());
        }
    }

    let mut runner = StepRunner {
        state: run_state,
        path: state_path.clone(),
    };

    runner.run(Step::ImageWritten, || {
        log::info!(
            "Writing {} -> {}",
            opts.image.display(),
            opts.device.display()
        );
        let pb = flash_progress_bar(&opts.image, image_len);
        let flash_opts = FlashOptions::new(false, true);
        hal.flash_raw_image(&opts.image, &opts.device, &flash_opts, &mut |done, total| {
            if total > 0 {
                pb.set_length(total);
            }
            pb.set_position(done);
        })?;
        pb.finish_with_message("Write complete.");
        Ok(())
    })?;

    runner.run(Step::TableReprobed, || {
        log::info!("Waiting for the kernel to pick up the new partition table");
        hal.sync()?;
        hal.partprobe(&opts.device)?;
        hal.udev_settle()?;
        Ok(())
    })?;

    let parted_opts = PartedOptions::new(false, true);
    let print_out = hal.parted(&opts.device, PartedOp::Print, &parted_opts)?;
    let table = table::parse_machine_print(&print_out)?;
    if table.label != "msdos" && table.label != "dos" {
        bail!(
            "Partition table on {} is {:?}, expected a DOS/MBR label. Will not continue.",
            opts.device.display(),
            table.label
        );
    }
    let plan = table::plan_layout(&table, system_size_gib)?;

    let system_part = device::partition_path(&opts.device, 2);
    let data_part = device::partition_path(&opts.device, 3);

    runner.run(Step::FilesystemChecked, || {
        log::info!("Checking the system partition filesystem");
        hal.fsck_ext4(&system_part, false)?;
        Ok(())
    })?;

    runner.run(Step::PartitionResized, || {
        log::info!(
            "Growing the system partition to end at sector {}",
            plan.system_end
        );
        hal.parted(
            &opts.device,
            PartedOp::ResizePart {
                part_num: 2,
                end: format!("{}s", plan.system_end),
            },
            &parted_opts,
        )?;
        Ok(())
    })?;

    runner.run(Step::FilesystemResized, || {
        log::info!("Growing the filesystem to fill the resized partition");
        hal.resize_ext4(&system_part, None, false)?;
        hal.fsck_ext4(&system_part, false)?;
        Ok(())
    })?;

    runner.run(Step::DataPartitionCreated, || {
        log::info!(
            "Creating the data partition over sectors {}..{}",
            plan.data_start,
            plan.data_end
        );
        hal.parted(
            &opts.device,
            PartedOp::MkPart {
                part_type: "primary".to_string(),
                start: format!("{}s", plan.data_start),
                end: format!("{}s", plan.data_end),
            },
            &parted_opts,
        )?;
        hal.partprobe(&opts.device)?;
        hal.udev_settle()?;
        Ok(())
    })?;

    runner.run(Step::DataFilesystemCreated, || {
        log::info!("Formatting the data partition as ext4");
        hal.format_ext4(&data_part, &FormatOptions::new(false, true))?;
        hal.fsck_ext4(&data_part, false)?;
        Ok(())
    })?;

    runner.run(Step::Complete, || Ok(()))?;
    state::remove_state(&state_path)?;

    // Best-effort: the UUID is what first-boot wires into /etc/fstab.
    match hal.blkid_uuid(&data_part) {
        Ok(uuid) => log::info!(
            "Disk management complete. Data partition: {} (UUID={})",
            data_part.display(),
            uuid
        ),
        Err(_) => log::info!(
            "Disk management complete. Data partition: {}",
            data_part.display()
        ),
    }
    Ok(())
}

fn flash_progress_bar(image: &Path, image_len: u64) -> ProgressBar {
    let is_xz = image.extension().is_some_and(|e| e == "xz");
    if is_xz {
        // Uncompressed size is unknown until the stream ends.
        let pb = ProgressBar::new_spinner();
        pb.set_prefix("Writing");
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{prefix:12} [{elapsed_precise}] {bytes} ({bytes_per_sec}) {msg}")
                .unwrap(),
        );
        pb
    } else {
        let pb = ProgressBar::new(image_len);
        pb.set_prefix("Writing");
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{prefix:12} [{elapsed_precise}] [{bar:40.green/black}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                )
                .unwrap()
                .progress_chars("■ "),
        );
        pb
    }
}
