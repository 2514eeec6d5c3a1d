mod common;

use common::{PanicPrompter, ScriptedPrompter};
use nodesmith::errors::NodesmithError;
use nodesmith::partition::state::{self, FlashState, Step};
use nodesmith::partition::{self, PartitionOptions};
use nodesmith_hal::{FakeHal, Operation};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const GIB: u64 = 1024 * 1024 * 1024;

/// 64 GiB disk with the usual two image partitions (boot + system).
const PARTED_PRINT: &str = "\
BYT;
/dev/sdz:134217728s:scsi:512:512:msdos:Mass Storage Device:;
1:8192s:532479s:524288s:fat32::lba;
2:532480s:3788799s:3256320s:ext4::;
";

struct Fixture {
    dir: TempDir,
    hal: FakeHal,
    device: PathBuf,
    image: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let device = dir.path().join("sdz");
        std::fs::write(&device, b"").unwrap();
        let image = dir.path().join("image.img");
        std::fs::write(&image, vec![0u8; 4096]).unwrap();

        let hal = FakeHal::new();
        hal.set_disk_size_bytes(64 * GIB);
        hal.set_parted_print(PARTED_PRINT);

        Self {
            dir,
            hal,
            device,
            image,
        }
    }

    fn options(&self, force: bool) -> PartitionOptions {
        PartitionOptions {
            device: self.device.clone(),
            image: self.image.clone(),
            system_size_gib: Some(20),
            force,
            resume: false,
            state_dir: self.dir.path().join("state"),
        }
    }
}

fn op_names(hal: &FakeHal) -> Vec<String> {
    hal.operations()
        .iter()
        .map(|op| match op {
            Operation::FlashImage { .. } => "flash".to_string(),
            Operation::Parted { op, .. } => format!("parted:{}", op.split(' ').next().unwrap_or("")),
            Operation::FsckExt4 { .. } => "fsck".to_string(),
            Operation::ResizeExt4 { .. } => "resize2fs".to_string(),
            Operation::FormatExt4 { .. } => "mkfs".to_string(),
            other => format!("{:?}", other)
                .split(' ')
                .next()
                .unwrap_or("")
                .trim_matches('{')
                .to_string(),
        })
        .collect()
}

#[test]
fn forced_run_completes_without_any_prompt() {
    let fx = Fixture::new();
    let opts = fx.options(true);

    partition::run(&fx.hal, &PanicPrompter, &opts).unwrap();

    assert!(fx
        .hal
        .has_operation(|op| matches!(op, Operation::FlashImage { .. })));
    assert!(fx
        .hal
        .has_operation(|op| matches!(op, Operation::Parted { op, .. } if op.starts_with("ResizePart"))));
    assert!(fx
        .hal
        .has_operation(|op| matches!(op, Operation::Parted { op, .. } if op.starts_with("MkPart"))));
    assert!(fx
        .hal
        .has_operation(|op| matches!(op, Operation::FormatExt4 { .. })));

    // The flash happens before any partition surgery.
    let names = op_names(&fx.hal);
    let flash_at = names.iter().position(|n| n == "flash").unwrap();
    let resize_at = names
        .iter()
        .position(|n| n.starts_with("parted:ResizePart"))
        .unwrap();
    let mkfs_at = names.iter().position(|n| n == "mkfs").unwrap();
    assert!(flash_at < resize_at);
    assert!(resize_at < mkfs_at);

    // A finished run leaves no state behind.
    let state_path = state::state_path(&opts.state_dir, &opts.device);
    assert!(state::load_state(&state_path).unwrap().is_none());
}

#[test]
fn data_partition_lands_on_the_third_partition() {
    let fx = Fixture::new();
    partition::run(&fx.hal, &PanicPrompter, &fx.options(true)).unwrap();

    let expected = PathBuf::from(format!("{}3", fx.device.display()));
    assert!(fx.hal.has_operation(
        |op| matches!(op, Operation::FormatExt4 { device } if *device == expected)
    ));
}

#[test]
fn unforced_run_blocks_on_confirmation() {
    let fx = Fixture::new();
    let prompter = ScriptedPrompter::yes();

    partition::run(&fx.hal, &prompter, &fx.options(false)).unwrap();

    assert!(prompter.prompt_count() > 0);
    assert!(fx
        .hal
        .has_operation(|op| matches!(op, Operation::FlashImage { .. })));
}

#[test]
fn declined_confirmation_aborts_before_writing() {
    let fx = Fixture::new();
    let prompter = ScriptedPrompter::no();

    let err = partition::run(&fx.hal, &prompter, &fx.options(false)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<NodesmithError>(),
        Some(NodesmithError::Aborted)
    ));
    assert!(!fx
        .hal
        .has_operation(|op| matches!(op, Operation::FlashImage { .. })));
}

#[test]
fn system_size_below_image_size_aborts_before_writing() {
    let fx = Fixture::new();
    // A sparse 25 GiB image cannot fit into a 20 GiB system partition.
    let file = std::fs::File::create(&fx.image).unwrap();
    file.set_len(25 * GIB).unwrap();

    let err = partition::run(&fx.hal, &PanicPrompter, &fx.options(true)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<NodesmithError>(),
        Some(NodesmithError::SizePrecondition(_))
    ));
    assert!(!fx
        .hal
        .has_operation(|op| matches!(op, Operation::FlashImage { .. })));
}

#[test]
fn mounted_partitions_block_the_run() {
    let fx = Fixture::new();
    fx.hal
        .set_mountpoints(vec![PathBuf::from("/mnt/somewhere")]);

    let err = partition::run(&fx.hal, &PanicPrompter, &fx.options(true)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<NodesmithError>(),
        Some(NodesmithError::DeviceBusy(_))
    ));
    assert!(!fx
        .hal
        .has_operation(|op| matches!(op, Operation::FlashImage { .. })));
}

#[test]
fn non_dos_partition_table_stops_the_sequence() {
    let fx = Fixture::new();
    fx.hal.set_parted_print(
        "BYT;\n/dev/sdz:134217728s:scsi:512:512:gpt:Mass Storage Device:;\n1:8192s:532479s:524288s:fat32::;\n",
    );

    let err = partition::run(&fx.hal, &PanicPrompter, &fx.options(true)).unwrap_err();
    assert!(err.to_string().contains("expected a DOS/MBR label"));
    // The image was already written when the table was inspected.
    assert!(fx
        .hal
        .has_operation(|op| matches!(op, Operation::FlashImage { .. })));
    assert!(!fx
        .hal
        .has_operation(|op| matches!(op, Operation::FormatExt4 { .. })));
}

#[test]
fn interrupted_state_requires_resume_or_force() {
    let fx = Fixture::new();
    let opts = fx.options(false);

    let state_path = state::state_path(&opts.state_dir, &opts.device);
    let mut prev = FlashState::new(&opts.device, &opts.image, 20);
    prev.mark_completed(Step::ImageWritten);
    state::save_state_atomic(&state_path, &prev).unwrap();

    let err = partition::run(&fx.hal, &ScriptedPrompter::yes(), &opts).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<NodesmithError>(),
        Some(NodesmithError::InterruptedRun(_))
    ));
}

#[test]
fn resume_skips_completed_steps() {
    let fx = Fixture::new();
    let mut opts = fx.options(true);
    opts.resume = true;
    opts.force = false;

    let state_path = state::state_path(&opts.state_dir, &opts.device);
    let mut prev = FlashState::new(&opts.device, &opts.image, 20);
    prev.mark_completed(Step::ImageWritten);
    prev.mark_completed(Step::TableReprobed);
    state::save_state_atomic(&state_path, &prev).unwrap();

    partition::run(&fx.hal, &ScriptedPrompter::yes(), &opts).unwrap();

    // The image write is not repeated, the remaining steps run.
    assert!(!fx
        .hal
        .has_operation(|op| matches!(op, Operation::FlashImage { .. })));
    assert!(fx
        .hal
        .has_operation(|op| matches!(op, Operation::Parted { op, .. } if op.starts_with("ResizePart"))));
    assert!(fx
        .hal
        .has_operation(|op| matches!(op, Operation::FormatExt4 { .. })));
    assert!(state::load_state(&state_path).unwrap().is_none());
}

#[test]
fn resume_refuses_a_different_image() {
    let fx = Fixture::new();
    let mut opts = fx.options(false);
    opts.resume = true;

    let state_path = state::state_path(&opts.state_dir, &opts.device);
    let prev = FlashState::new(&opts.device, Path::new("/somewhere/else.img"), 20);
    state::save_state_atomic(&state_path, &prev).unwrap();

    let err = partition::run(&fx.hal, &ScriptedPrompter::yes(), &opts).unwrap_err();
    assert!(err.to_string().contains("different device/image"));
}
