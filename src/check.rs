use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::prompt::PromptSpec;
use crate::config::{load_package_config, Settings, TomlConfigProvider};
use crate::derive::{derive, DerivationGroup, Derivations, DeriveRequest};
use crate::error::{Result, StampError};
use crate::prompt::Prompter;
use crate::render::walker::{resolve_templates_dir, slash_path};
use crate::render::{is_binary, resolve_tokens, ContentRenderer};
use crate::script::create_engine;
use crate::PACKAGE_DIR_FIELD;

/// Result of validating a package.
pub struct CheckResult {
    pub has_config: bool,
    pub prompt_count: usize,
    pub derived_count: usize,
    pub template_count: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Answers prompts with their defaults, or the prompt name when there is none.
struct PlaceholderPrompter;

impl Prompter for PlaceholderPrompter {
    fn ask(&self, prompts: &[PromptSpec]) -> Result<Map<String, Value>> {
        Ok(prompts
            .iter()
            .map(|p| {
                let answer = p.default.clone().unwrap_or_else(|| p.name.clone());
                (p.name.clone(), Value::String(answer))
            })
            .collect())
    }
}

/// Validate a package directory.
///
/// Configuration errors are returned as `Err`; problems found past that point
/// are collected into the result.
pub async fn check_package(package_dir: &Path, settings: &Settings) -> Result<CheckResult> {
    let engine = Arc::new(create_engine());
    let config = load_package_config(package_dir, settings, &TomlConfigProvider, engine.clone())?;
    let has_config = config.has_manifest;

    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    if !has_config {
        warnings.push(format!(
            "No {} found; using default prompts",
            settings.config_file
        ));
    }

    let derivations = Derivations {
        builtin: DerivationGroup::builtin(),
        caller: DerivationGroup::caller(),
        package: config.derived.clone(),
    };
    let mut injected = Map::new();
    injected.insert(
        PACKAGE_DIR_FIELD.to_string(),
        Value::String(package_dir.display().to_string()),
    );

    let request = DeriveRequest {
        settings,
        prompts: &config.prompts,
        derivations: &derivations,
        overrides: config.manifest.overrides.as_deref(),
        injected,
    };

    let mut template_count = 0;
    match derive(request, &PlaceholderPrompter).await {
        Ok(context) => match resolve_templates_dir(settings, package_dir, &context) {
            Ok(root) => {
                let renderer = ContentRenderer::new(engine);
                template_count =
                    check_templates(&root, &context, &renderer, &mut warnings, &mut errors);
            }
            Err(e) => errors.push(e.to_string()),
        },
        Err(e) => errors.push(format!("Derivation: {e}")),
    }

    Ok(CheckResult {
        has_config,
        prompt_count: config.prompts.len(),
        derived_count: config.derived.len(),
        template_count,
        warnings,
        errors,
    })
}

fn check_templates(
    root: &Path,
    context: &crate::context::DataContext,
    renderer: &ContentRenderer,
    warnings: &mut Vec<String>,
    errors: &mut Vec<String>,
) -> usize {
    let mut count = 0;

    for entry in walkdir::WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                errors.push(format!("Could not walk {path}: {e}"));
                continue;
            }
        };
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map(slash_path)
            .unwrap_or_else(|_| entry.path().display().to_string());

        if !file_type.is_file() {
            errors.push(format!("Unsupported entry (not a file or directory): {rel}"));
            continue;
        }
        count += 1;

        match resolve_tokens(&rel, context) {
            Err(e @ StampError::MalformedToken { .. }) => errors.push(e.to_string()),
            Err(e) => warnings.push(format!("{e} (using prompt defaults)")),
            Ok(_) => {}
        }

        match std::fs::read(entry.path()) {
            Ok(buffer) if is_binary(&buffer) => {}
            Ok(buffer) => {
                if let Err(e) = renderer.check(&String::from_utf8_lossy(&buffer)) {
                    errors.push(format!("Template syntax error in {rel}: {e}"));
                }
            }
            Err(e) => warnings.push(format!("Could not read {rel}: {e}")),
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_valid_package() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "stamp.toml",
            "[prompts.name]\ndefault = \"demo\"\n\n[derived]\nupper = \"name.to_upper()\"\n",
        );
        write(dir.path(), "templates/{{name}}.txt", "Hi <%= upper %>");

        let result = check_package(dir.path(), &Settings::default()).await.unwrap();
        assert!(result.has_config);
        assert_eq!(result.prompt_count, 2);
        assert_eq!(result.derived_count, 1);
        assert_eq!(result.template_count, 1);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
    }

    #[tokio::test]
    async fn test_reports_template_syntax_errors() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "templates/bad.txt", "<% for { %>");

        let result = check_package(dir.path(), &Settings::default()).await.unwrap();
        assert!(!result.has_config);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("bad.txt"));
    }

    #[tokio::test]
    async fn test_reports_missing_templates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = check_package(dir.path(), &Settings::default()).await.unwrap();
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("directory not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reports_walk_errors() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "templates/ok.txt", "fine");
        write(dir.path(), "templates/locked/inner.txt", "hidden");
        let locked = dir.path().join("templates/locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        let readable = fs::read_dir(&locked).is_ok();

        let result = check_package(dir.path(), &Settings::default()).await.unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // Running as root bypasses directory permissions.
        if !readable {
            assert_eq!(result.errors.len(), 1, "{:?}", result.errors);
            assert!(result.errors[0].contains("locked"));
        }
        assert_eq!(result.template_count, usize::from(readable) + 1);
    }

    #[tokio::test]
    async fn test_invalid_script_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "stamp.toml", "[files]\nfilter = \"let = ;\"\n");
        let result = check_package(dir.path(), &Settings::default()).await;
        assert!(matches!(result, Err(StampError::InvalidScript { .. })));
    }
}
