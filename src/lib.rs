pub mod check;
pub mod config;
pub mod context;
pub mod derive;
pub mod error;
pub mod prompt;
pub mod render;
pub mod script;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{load_package_config, Settings, TomlConfigProvider};
use crate::context::DataContext;
use crate::derive::{derive, DerivationGroup, Derivations, DeriveRequest};
use crate::error::{Result, StampError};
use crate::prompt::Prompter;
use crate::render::{
    render_entries, validate_unique, walk, write_entries, ContentRenderer, Materialized,
    TemplateEntry, WalkRequest,
};

/// Field holding the absolute package directory, set before any answers.
pub const PACKAGE_DIR_FIELD: &str = "_packageDir";

pub struct InflateOptions {
    pub package_dir: PathBuf,
    /// Raw JSON answers; takes precedence over the package's own `overrides`.
    pub overrides: Option<String>,
    /// Caller-stage derived fields.
    pub caller: DerivationGroup,
    pub settings: Settings,
}

impl InflateOptions {
    pub fn new(package_dir: impl Into<PathBuf>) -> Self {
        Self {
            package_dir: package_dir.into(),
            overrides: None,
            caller: DerivationGroup::caller(),
            settings: Settings::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: impl Into<String>) -> Self {
        self.overrides = Some(overrides.into());
        self
    }

    pub fn with_caller(mut self, caller: DerivationGroup) -> Self {
        self.caller = caller;
        self
    }
}

/// A fully resolved, rendered and validated set of files, not yet written.
#[derive(Debug)]
pub struct InflatePlan {
    pub context: DataContext,
    pub destination: PathBuf,
    pub entries: Vec<TemplateEntry>,
}

/// Collect answers, derive data, walk and render the package, and check for
/// conflicts. Nothing is written.
pub async fn plan_inflation(options: &InflateOptions, prompter: &dyn Prompter) -> Result<InflatePlan> {
    let settings = &options.settings;
    let package_dir = absolute(&options.package_dir)?;
    let engine = Arc::new(script::create_engine());

    let config = load_package_config(&package_dir, settings, &TomlConfigProvider, engine.clone())?;

    let derivations = Derivations {
        builtin: DerivationGroup::builtin(),
        caller: options.caller.clone(),
        package: config.derived.clone(),
    };
    let overrides = options
        .overrides
        .as_deref()
        .or(config.manifest.overrides.as_deref());

    let mut injected = Map::new();
    injected.insert(
        PACKAGE_DIR_FIELD.to_string(),
        Value::String(package_dir.display().to_string()),
    );

    let context = derive(
        DeriveRequest {
            settings,
            prompts: &config.prompts,
            derivations: &derivations,
            overrides,
            injected,
        },
        prompter,
    )
    .await?;

    let destination = resolve_destination(settings, &context)?;
    debug!(destination = %destination.display(), "resolved destination");

    let mut entries = walk(WalkRequest {
        settings,
        package_dir: &package_dir,
        destination: &destination,
        context: &context,
        filter: config.filter.as_ref(),
    })
    .await?;

    let renderer = ContentRenderer::new(engine);
    render_entries(&mut entries, &destination, &context, &renderer)?;
    validate_unique(&entries)?;

    Ok(InflatePlan {
        context,
        destination,
        entries,
    })
}

/// Write a planned inflation to disk.
pub async fn execute_inflation(plan: InflatePlan) -> Result<Materialized> {
    write_entries(&plan.destination, plan.entries).await
}

/// Materialize a package into a new directory.
pub async fn inflate(options: &InflateOptions, prompter: &dyn Prompter) -> Result<Materialized> {
    let plan = plan_inflation(options, prompter).await?;
    execute_inflation(plan).await
}

fn resolve_destination(settings: &Settings, context: &DataContext) -> Result<PathBuf> {
    let destination = context
        .text(&settings.destination_field)
        .ok_or(StampError::MissingDestination)?;
    absolute(Path::new(&destination))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| StampError::Io {
        context: "getting current directory".into(),
        source: e,
    })?;
    Ok(cwd.join(path))
}
