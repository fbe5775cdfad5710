use std::fmt;
use std::path::Path;
use std::sync::Arc;

use regex_lite::Regex;

use super::Settings;

pub type ValidateFn = Arc<dyn Fn(&str) -> std::result::Result<(), String> + Send + Sync>;

/// Checks a prompt answer before it is accepted.
#[derive(Clone)]
pub enum Validator {
    Pattern { regex: Regex, message: String },
    /// Non-empty path that must not exist yet.
    NewPath,
    Custom(ValidateFn),
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::Pattern { regex, message } => f
                .debug_struct("Pattern")
                .field("regex", &regex.as_str())
                .field("message", message)
                .finish(),
            Validator::NewPath => f.write_str("NewPath"),
            Validator::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Validator {
    pub fn pattern(
        pattern: &str,
        message: Option<String>,
    ) -> std::result::Result<Self, regex_lite::Error> {
        let regex = Regex::new(pattern)?;
        let message = message.unwrap_or_else(|| format!("Must match pattern: {pattern}"));
        Ok(Validator::Pattern { regex, message })
    }

    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        Validator::Custom(Arc::new(check))
    }

    pub fn validate(&self, input: &str) -> std::result::Result<(), String> {
        match self {
            Validator::Pattern { regex, message } => {
                if regex.is_match(input) {
                    Ok(())
                } else {
                    Err(message.clone())
                }
            }
            Validator::NewPath => {
                if input.trim().is_empty() {
                    Err("A path is required".to_string())
                } else if Path::new(input).exists() {
                    Err(format!("Path: {input} already exists"))
                } else {
                    Ok(())
                }
            }
            Validator::Custom(check) => check(input),
        }
    }
}

/// One question asked before materialization.
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub name: String,
    pub message: String,
    pub default: Option<String>,
    pub validator: Option<Validator>,
}

impl PromptSpec {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            default: None,
            validator: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn validate(&self, input: &str) -> std::result::Result<(), String> {
        match &self.validator {
            Some(validator) => validator.validate(input),
            None => Ok(()),
        }
    }
}

pub const DESTINATION_MESSAGE: &str = "Destination directory to write";

/// The prompt appended when a package declares no destination prompt.
pub fn destination_prompt(
    settings: &Settings,
    message: Option<String>,
    default: Option<String>,
) -> PromptSpec {
    let mut spec = PromptSpec::new(
        settings.destination_field.clone(),
        message.unwrap_or_else(|| DESTINATION_MESSAGE.to_string()),
    )
    .with_validator(Validator::NewPath);
    spec.default = default;
    spec
}
