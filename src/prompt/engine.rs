use inquire::validator::{ErrorMessage, Validation};
use inquire::InquireError;
use serde_json::{Map, Value};
use tracing::debug;

use super::Prompter;
use crate::config::prompt::PromptSpec;
use crate::error::{Result, StampError};

/// Interactive terminal prompts.
#[derive(Debug, Default, Clone, Copy)]
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn ask(&self, prompts: &[PromptSpec]) -> Result<Map<String, Value>> {
        let mut answers = Map::new();
        for spec in prompts {
            let answer = prompt_text(spec)?;
            answers.insert(spec.name.clone(), Value::String(answer));
        }
        Ok(answers)
    }
}

fn prompt_text(spec: &PromptSpec) -> Result<String> {
    let mut prompt = inquire::Text::new(&spec.message);
    if let Some(default) = &spec.default {
        prompt = prompt.with_default(default);
    }
    if let Some(validator) = spec.validator.clone() {
        prompt = prompt.with_validator(move |input: &str| {
            Ok(match validator.validate(input) {
                Ok(()) => Validation::Valid,
                Err(message) => Validation::Invalid(ErrorMessage::Custom(message)),
            })
        });
    }

    prompt.prompt().map_err(|e| match e {
        InquireError::NotTTY => StampError::ValidationFailed {
            name: spec.name.clone(),
            message: "no terminal available; pass --prompts or --defaults".into(),
        },
        _ => StampError::PromptCancelled,
    })
}

/// Answers every prompt with its default, without interaction.
///
/// Defaults still go through the prompt's validator, so a destination
/// default that already exists is rejected here just as it would be
/// interactively.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultsPrompter;

impl Prompter for DefaultsPrompter {
    fn ask(&self, prompts: &[PromptSpec]) -> Result<Map<String, Value>> {
        let mut answers = Map::new();
        for spec in prompts {
            let Some(default) = &spec.default else {
                return Err(StampError::ValidationFailed {
                    name: spec.name.clone(),
                    message: "no default value to use without prompting".into(),
                });
            };
            spec.validate(default)
                .map_err(|message| StampError::ValidationFailed {
                    name: spec.name.clone(),
                    message,
                })?;
            debug!(prompt = %spec.name, "using default answer");
            answers.insert(spec.name.clone(), Value::String(default.clone()));
        }
        Ok(answers)
    }
}
