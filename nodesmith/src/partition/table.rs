//! Parsing of `parted -ms <disk> unit s print` output and sector arithmetic.

use anyhow::{anyhow, bail, Result};
use std::collections::BTreeMap;

pub const SECTOR_SIZE: u64 = 512;
pub const ALIGNMENT_SECTORS: u64 = 2048;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub start: u64,
    pub end: u64,
    pub length: u64,
    pub filesystem: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    pub total_sectors: u64,
    pub label: String,
    pub partitions: BTreeMap<u32, PartitionInfo>,
}

fn parse_sectors(field: &str) -> Result<u64> {
    field
        .trim()
        .trim_end_matches('s')
        .parse::<u64>()
        .map_err(|e| anyhow!("bad sector value {:?}: {}", field, e))
}

/// Parse the machine-readable parted print format.
///
/// The output looks like:
/// ```text
/// BYT;
/// /dev/sdb:62333952s:scsi:512:512:msdos:Mass Storage Device:;
/// 1:8192s:532479s:524288s:fat32::lba;
/// 2:532480s:3788799s:3256320s:ext4::;
/// ```
pub fn parse_machine_print(output: &str) -> Result<PartitionTable> {
    let mut total_sectors = None;
    let mut label = None;
    let mut partitions = BTreeMap::new();

    for line in output.lines() {
        let line = line.trim().trim_end_matches(';');
        if line.is_empty() || line == "BYT" {
            continue;
        }

        let fields: Vec<&str> = line.split(':').collect();
        if line.starts_with('/') {
            if fields.len() < 6 {
                bail!("malformed parted device line: {:?}", line);
            }
            total_sectors = Some(parse_sectors(fields[1])?);
            label = Some(fields[5].to_string());
            continue;
        }

        // Partition rows start with the partition number.
        let Ok(index) = fields[0].parse::<u32>() else {
            bail!("unrecognized parted output line: {:?}", line);
        };
        if fields.len() < 5 {
            bail!("malformed parted partition line: {:?}", line);
        }
        partitions.insert(
            index,
            PartitionInfo {
                start: parse_sectors(fields[1])?,
                end: parse_sectors(fields[2])?,
                length: parse_sectors(fields[3])?,
                filesystem: fields[4].to_string(),
            },
        );
    }

    let total_sectors =
        total_sectors.ok_or_else(|| anyhow!("parted output carried no device line"))?;
    let label = label.ok_or_else(|| anyhow!("parted output carried no label field"))?;

    Ok(PartitionTable {
        total_sectors,
        label,
        partitions,
    })
}

/// Round a sector up to the next alignment boundary.
pub fn align_sector(sector: u64) -> u64 {
    sector.div_ceil(ALIGNMENT_SECTORS) * ALIGNMENT_SECTORS
}

/// The computed target layout: where the system partition ends and where the
/// data partition goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    pub system_end: u64,
    pub data_start: u64,
    pub data_end: u64,
}

/// Compute the new layout from the observed table and the requested system
/// partition size.
pub fn plan_layout(table: &PartitionTable, system_size_gib: u64) -> Result<PartitionPlan> {
    let system = table
        .partitions
        .get(&2)
        .ok_or_else(|| anyhow!("could not find the system partition (partition 2)"))?;

    let system_size_sectors = system_size_gib * 1024 * 1024 * 1024 / SECTOR_SIZE;
    let system_end = align_sector(system.start + system_size_sectors);

    let data_start = align_sector(system_end + 1);
    let mut data_end = table.total_sectors - 1;
    data_end -= data_end % ALIGNMENT_SECTORS;

    if data_start >= data_end {
        bail!(
            "no space left for a data partition: system partition would end at sector {} of {}",
            system_end,
            table.total_sectors
        );
    }

    Ok(PartitionPlan {
        system_end,
        data_start,
        data_end,
    })
}
