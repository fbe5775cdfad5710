pub mod engine;

use serde_json::{Map, Value};

use crate::config::prompt::PromptSpec;
use crate::error::Result;

pub use engine::{DefaultsPrompter, InquirePrompter};

/// Asks every prompt in order and returns the answers by prompt name.
pub trait Prompter {
    fn ask(&self, prompts: &[PromptSpec]) -> Result<Map<String, Value>>;
}
