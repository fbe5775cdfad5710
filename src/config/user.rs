use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use rhai::Engine;
use serde::{Deserialize, Serialize};

use crate::derive::DerivationGroup;
use crate::error::{Result, StampError};

/// User-level configuration loaded from `~/.config/stamp/config.toml`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UserConfig {
    /// Derived fields added to every run, as Rhai expressions. They run in the
    /// caller stage, so packages may read them and reserved-prefix prompts
    /// may override them.
    #[serde(default)]
    pub derived: IndexMap<String, String>,
}

impl UserConfig {
    pub fn caller_group(&self, engine: Arc<Engine>) -> Result<DerivationGroup> {
        super::script_group(DerivationGroup::caller(), &self.derived, engine)
    }
}

/// Get the path to the user config file.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("stamp").join("config.toml"))
}

/// Load user configuration from the platform config directory.
///
/// Returns `Ok(None)` if the config file does not exist.
pub fn load_user_config() -> Result<Option<UserConfig>> {
    match config_path() {
        Some(path) => load_user_config_from(&path),
        None => Ok(None),
    }
}

pub fn load_user_config_from(path: &Path) -> Result<Option<UserConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| StampError::Io {
        context: format!("reading user config {}", path.display()),
        source: e,
    })?;

    let config: UserConfig = toml::from_str(&content).map_err(|e| StampError::ConfigParse {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_user_config() {
        let toml_str = r#"
[derived]
author = '"Jane Doe"'
year = "2024"
"#;
        let config: UserConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.derived.len(), 2);
        assert_eq!(config.derived["author"], r#""Jane Doe""#);
    }

    #[test]
    fn parse_empty_config() {
        let config: UserConfig = toml::from_str("").unwrap();
        assert!(config.derived.is_empty());
    }

    #[test]
    fn caller_group_compiles_scripts() {
        let config: UserConfig = toml::from_str("[derived]\nauthor = '\"Jane\"'").unwrap();
        let group = config
            .caller_group(Arc::new(crate::script::create_engine()))
            .unwrap();
        assert!(group.contains("author"));
        assert_eq!(group.stage(), crate::derive::DerivationStage::Caller);
    }

    #[test]
    fn malformed_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not valid [[ toml").unwrap();
        assert!(matches!(
            load_user_config_from(&path),
            Err(StampError::ConfigParse { .. })
        ));
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_user_config_from(&dir.path().join("absent.toml")).unwrap();
        assert!(result.is_none());
    }
}
