//! Shared helpers for the integration tests.

use anyhow::Result;
use nodesmith::confirm::Prompter;
use std::sync::Mutex;

/// Prompter with scripted answers that records every prompt it was shown.
pub struct ScriptedPrompter {
    confirm_answer: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn yes() -> Self {
        Self {
            confirm_answer: true,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn no() -> Self {
        Self {
            confirm_answer: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.confirm_answer)
    }

    fn input_u64(&self, prompt: &str, default: u64) -> Result<u64> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(default)
    }
}

/// Prompter that fails the test if anything ever asks a question.
///
/// Used to prove that `--force` runs never block on interaction.
pub struct PanicPrompter;

impl Prompter for PanicPrompter {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        panic!("unexpected confirmation prompt: {}", prompt);
    }

    fn input_u64(&self, prompt: &str, _default: u64) -> Result<u64> {
        panic!("unexpected input prompt: {}", prompt);
    }
}
