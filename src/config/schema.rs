use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::prompt::{destination_prompt, PromptSpec, Validator};
use super::Settings;
use crate::error::{Result, StampError};

/// Contents of a package's `stamp.toml`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PackageManifest {
    /// Raw JSON answer payload used instead of prompting.
    #[serde(default)]
    pub overrides: Option<String>,

    #[serde(default)]
    pub prompts: PromptTable,

    #[serde(default)]
    pub destination: Option<DestinationConfig>,

    /// Field name to Rhai expression.
    #[serde(default)]
    pub derived: IndexMap<String, String>,

    #[serde(default)]
    pub files: FilesConfig,
}

/// Prompts keyed by name (`[prompts.name]`) or as a list (`[[prompts]]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PromptTable {
    Map(IndexMap<String, PromptConfig>),
    List(Vec<NamedPromptConfig>),
}

impl Default for PromptTable {
    fn default() -> Self {
        PromptTable::Map(IndexMap::new())
    }
}

impl PromptTable {
    /// Prompts in declared order.
    pub fn entries(&self) -> Vec<(&str, &PromptConfig)> {
        match self {
            PromptTable::Map(map) => map.iter().map(|(n, c)| (n.as_str(), c)).collect(),
            PromptTable::List(list) => list.iter().map(|p| (p.name.as_str(), &p.config)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PromptTable::Map(map) => map.len(),
            PromptTable::List(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PromptConfig {
    pub message: Option<String>,
    pub default: Option<toml::Value>,
    /// Regular expression the answer must match.
    pub validate: Option<String>,
    pub validate_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NamedPromptConfig {
    pub name: String,
    #[serde(flatten)]
    pub config: PromptConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DestinationConfig {
    pub message: Option<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FilesConfig {
    /// Rhai expression with `path` and `included` in scope; returns keep/drop.
    pub filter: Option<String>,
}

impl PackageManifest {
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for (name, prompt) in self.prompts.entries() {
            if name.trim().is_empty() {
                return Err(StampError::InvalidPrompt {
                    name: name.to_string(),
                    reason: "prompt names must not be empty".into(),
                });
            }
            if !seen.insert(name) {
                return Err(StampError::InvalidPrompt {
                    name: name.to_string(),
                    reason: "prompt is declared more than once".into(),
                });
            }
            build_prompt(name, prompt)?;
        }
        Ok(())
    }

    /// Prompt specs in declared order, with the destination prompt appended
    /// when the package does not declare one itself.
    pub fn prompt_specs(&self, settings: &Settings) -> Result<Vec<PromptSpec>> {
        let mut specs = self
            .prompts
            .entries()
            .into_iter()
            .map(|(name, prompt)| build_prompt(name, prompt))
            .collect::<Result<Vec<_>>>()?;

        if !specs.iter().any(|s| s.name == settings.destination_field) {
            let custom = self.destination.clone().unwrap_or_default();
            specs.push(destination_prompt(settings, custom.message, custom.default));
        }

        Ok(specs)
    }
}

fn build_prompt(name: &str, config: &PromptConfig) -> Result<PromptSpec> {
    let mut spec = PromptSpec::new(name, config.message.as_deref().unwrap_or(name));

    if let Some(default) = &config.default {
        spec.default = Some(default_text(name, default)?);
    }

    if let Some(pattern) = &config.validate {
        let validator = Validator::pattern(pattern, config.validate_message.clone()).map_err(
            |e| StampError::InvalidPrompt {
                name: name.to_string(),
                reason: format!("invalid validation regex: {e}"),
            },
        )?;
        spec.validator = Some(validator);
    }

    Ok(spec)
}

fn default_text(name: &str, value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(n) => Ok(n.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        _ => Err(StampError::InvalidPrompt {
            name: name.to_string(),
            reason: "default must be a string, number or boolean".into(),
        }),
    }
}
