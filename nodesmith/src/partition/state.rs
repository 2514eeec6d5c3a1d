//! Step-indexed state for the flash-and-partition sequence.
//!
//! The sequence is destructive and not safely repeatable once it has partly
//! run, so each completed step is recorded in a small JSON file. A later
//! `--resume` skips the recorded steps instead of re-executing them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    ImageWritten,
    TableReprobed,
    FilesystemChecked,
    PartitionResized,
    FilesystemResized,
    DataPartitionCreated,
    DataFilesystemCreated,
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlashState {
    pub version: u32,
    pub device: String,
    pub image: String,
    pub system_size_gib: u64,
    pub completed: Vec<Step>,
}

impl FlashState {
    pub fn new(device: &Path, image: &Path, system_size_gib: u64) -> Self {
        Self {
            version: 1,
            device: device.display().to_string(),
            image: image.display().to_string(),
            system_size_gib,
            completed: Vec::new(),
        }
    }

    pub fn is_completed(&self, step: Step) -> bool {
        self.completed.contains(&step)
    }

    pub fn mark_completed(&mut self, step: Step) {
        if !self.is_completed(step) {
            self.completed.push(step);
        }
    }

    /// Whether a recorded state belongs to the same logical run.
    pub fn matches(&self, device: &Path, image: &Path) -> bool {
        self.device == device.display().to_string() && self.image == image.display().to_string()
    }
}

/// Path of the state file for a given device, with `/` flattened out.
pub fn state_path(state_dir: &Path, device: &Path) -> PathBuf {
    let name: String = device
        .display()
        .to_string()
        .chars()
        .map(|c| if c == '/' { '-' } else { c })
        .collect();
    state_dir.join(format!("{}.json", name.trim_start_matches('-')))
}

pub fn load_state(path: &Path) -> Result<Option<FlashState>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    let state = serde_json::from_str(&content).context("Failed to parse state file")?;
    Ok(Some(state))
}

pub fn save_state_atomic(path: &Path, state: &FlashState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(state).context("Failed to serialize state")?;

    let mut file = File::create(&tmp_path)
        .with_context(|| format!("Failed to create temp state file: {}", tmp_path.display()))?;
    file.write_all(payload.as_bytes())
        .context("Failed to write state")?;
    file.sync_all().context("Failed to flush state")?;

    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "Failed to atomically replace state file: {}",
            path.display()
        )
    })?;

    Ok(())
}

pub fn remove_state(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove state file: {}", path.display()))?;
    }
    Ok(())
}
