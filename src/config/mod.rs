pub mod prompt;
pub mod schema;
pub mod user;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use rhai::Engine;
use tracing::debug;

use crate::derive::DerivationGroup;
use crate::error::{Result, StampError};
use crate::script::Script;

pub use prompt::{PromptSpec, Validator};
pub use schema::PackageManifest;
pub use user::{load_user_config, UserConfig};

/// Per-run constants, assembled once and passed by reference.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_file: String,
    /// Path template naming the templates directory inside a package.
    pub templates_path: String,
    pub ignore_file: String,
    pub destination_field: String,
    pub reserved_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_file: "stamp.toml".into(),
            templates_path: "{{_templatesDir}}".into(),
            ignore_file: ".gitignore".into(),
            destination_field: "destination".into(),
            reserved_prefix: "_".into(),
        }
    }
}

/// Source of a package's manifest.
pub trait ConfigProvider {
    /// `Ok(None)` when the package carries no configuration.
    fn load(&self, package_dir: &Path, settings: &Settings) -> Result<Option<PackageManifest>>;
}

/// Reads `stamp.toml` from the package root.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlConfigProvider;

impl ConfigProvider for TomlConfigProvider {
    fn load(&self, package_dir: &Path, settings: &Settings) -> Result<Option<PackageManifest>> {
        let config_path = package_dir.join(&settings.config_file);
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path).map_err(|e| StampError::Io {
            context: format!("reading {}", config_path.display()),
            source: e,
        })?;

        let manifest = toml::from_str(&content).map_err(|e| StampError::ConfigParse {
            path: config_path,
            source: e,
        })?;

        Ok(Some(manifest))
    }
}

/// A package's configuration, validated and compiled.
#[derive(Debug, Clone)]
pub struct PackageConfig {
    pub package_dir: PathBuf,
    /// Whether the package has a config file; `manifest` is the default otherwise.
    pub has_manifest: bool,
    pub manifest: PackageManifest,
    pub prompts: Vec<PromptSpec>,
    pub derived: DerivationGroup,
    pub filter: Option<Script>,
}

pub const FILTER_NAME: &str = "files.filter";

/// Load, validate and compile a package's configuration.
pub fn load_package_config(
    package_dir: &Path,
    settings: &Settings,
    provider: &dyn ConfigProvider,
    engine: Arc<Engine>,
) -> Result<PackageConfig> {
    let loaded = provider.load(package_dir, settings)?;
    let has_manifest = loaded.is_some();
    let manifest = loaded.unwrap_or_default();
    manifest.validate()?;

    let prompts = manifest.prompt_specs(settings)?;
    let derived = script_group(DerivationGroup::package(), &manifest.derived, engine.clone())?;
    let filter = manifest
        .files
        .filter
        .as_deref()
        .map(|source| compile(engine, FILTER_NAME, source))
        .transpose()?;

    debug!(
        package = %package_dir.display(),
        prompts = prompts.len(),
        derived = derived.len(),
        filter = filter.is_some(),
        "loaded package config"
    );

    Ok(PackageConfig {
        package_dir: package_dir.to_path_buf(),
        has_manifest,
        manifest,
        prompts,
        derived,
        filter,
    })
}

pub(crate) fn script_group(
    group: DerivationGroup,
    scripts: &IndexMap<String, String>,
    engine: Arc<Engine>,
) -> Result<DerivationGroup> {
    scripts.iter().try_fold(group, |group, (name, source)| {
        Ok(group.script(compile(engine.clone(), name, source)?))
    })
}

fn compile(engine: Arc<Engine>, name: &str, source: &str) -> Result<Script> {
    Script::compile(engine, name, source).map_err(|message| StampError::InvalidScript {
        name: name.to_string(),
        message,
    })
}
