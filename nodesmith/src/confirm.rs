//! Confirmation helpers for destructive operations.
//!
//! Prompting goes through a trait so workflows can be tested without a
//! terminal; the managers never talk to dialoguer directly.

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input};

pub trait Prompter {
    /// Ask a yes/no question. Blocks until the user answers.
    fn confirm(&self, prompt: &str) -> Result<bool>;

    /// Ask for an integer with a suggested default.
    fn input_u64(&self, prompt: &str, default: u64) -> Result<u64>;
}

/// Terminal-backed prompter used by the real CLI.
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Failed to read confirmation input")
    }

    fn input_u64(&self, prompt: &str, default: u64) -> Result<u64> {
        Input::new()
            .with_prompt(prompt)
            .default(default)
            .interact_text()
            .context("Failed to read numeric input")
    }
}
