use std::path::{Component, Path, PathBuf};

use futures::future::try_join_all;
use rhai::Dynamic;
use tracing::{debug, trace};
use walkdir::WalkDir;

use super::ignore::IgnoreRules;
use super::token::resolve_tokens;
use crate::config::Settings;
use crate::context::DataContext;
use crate::error::{Result, StampError};
use crate::script::Script;

/// One template file on its way to the destination.
#[derive(Debug, Clone)]
pub struct TemplateEntry {
    /// Absolute source path.
    pub source: PathBuf,
    /// Source path relative to the templates directory.
    pub relative: PathBuf,
    /// The relative path before token substitution, `/`-separated.
    pub dest_template: String,
    /// Absolute destination path.
    pub dest: PathBuf,
    pub buffer: Vec<u8>,
    /// Rendered text, or `None` to write `buffer` unchanged.
    pub content: Option<String>,
}

impl TemplateEntry {
    /// The bytes that will be written.
    pub fn bytes(&self) -> &[u8] {
        match &self.content {
            Some(content) => content.as_bytes(),
            None => &self.buffer,
        }
    }

    pub fn is_rendered(&self) -> bool {
        self.content.is_some()
    }
}

pub struct WalkRequest<'a> {
    pub settings: &'a Settings,
    pub package_dir: &'a Path,
    pub destination: &'a Path,
    pub context: &'a DataContext,
    pub filter: Option<&'a Script>,
}

/// Fail unless nothing, not even a dangling symlink, exists at `destination`.
pub fn preflight_destination(destination: &Path) -> Result<()> {
    match std::fs::symlink_metadata(destination) {
        Ok(_) => Err(StampError::DestinationExists {
            path: destination.to_path_buf(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StampError::Io {
            context: format!("checking destination {}", destination.display()),
            source: e,
        }),
    }
}

/// Resolve the templates directory of a package and check that it exists.
pub fn resolve_templates_dir(
    settings: &Settings,
    package_dir: &Path,
    context: &DataContext,
) -> Result<PathBuf> {
    let relative = resolve_tokens(&settings.templates_path, context)?;
    let path = package_dir.join(relative);

    let metadata = match std::fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StampError::TemplatesDirMissing { path })
        }
        Err(e) => {
            return Err(StampError::Io {
                context: format!("reading {}", path.display()),
                source: e,
            })
        }
    };

    if !metadata.is_dir() {
        return Err(StampError::TemplatesDirNotADirectory { path });
    }
    Ok(path)
}

struct Candidate {
    source: PathBuf,
    relative: PathBuf,
    dest_template: String,
    resolved: String,
}

/// Enumerate, resolve, filter and read the template files of a package.
pub async fn walk(request: WalkRequest<'_>) -> Result<Vec<TemplateEntry>> {
    preflight_destination(request.destination)?;
    let root = resolve_templates_dir(request.settings, request.package_dir, request.context)?;
    debug!(root = %root.display(), "walking templates");

    let candidates = collect(&root, request.context)?;
    let rules = load_ignore_rules(&root, &candidates, request.settings).await?;

    let mut kept = Vec::new();
    for candidate in candidates {
        let path = slash_path(&candidate.relative);
        let mut included = rules.accepts(&candidate.relative);
        if let Some(filter) = request.filter {
            included = apply_filter(filter, request.context, &path, included)?;
        }
        trace!(path = %path, included, "filtered");
        if included {
            kept.push(candidate);
        }
    }

    let buffers = try_join_all(kept.iter().map(|candidate| read(&candidate.source))).await?;

    let mut entries: Vec<TemplateEntry> = kept
        .into_iter()
        .zip(buffers)
        .map(|(candidate, buffer)| TemplateEntry {
            dest: request.destination.join(&candidate.resolved),
            source: candidate.source,
            relative: candidate.relative,
            dest_template: candidate.dest_template,
            buffer,
            content: None,
        })
        .collect();
    entries.sort_by(|a, b| a.relative.cmp(&b.relative));

    debug!(files = entries.len(), "collected template files");
    Ok(entries)
}

fn collect(root: &Path, context: &DataContext) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| StampError::Io {
            context: format!("walking {}", root.display()),
            source: e.into(),
        })?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            return Err(StampError::UnsupportedEntry {
                path: entry.path().to_path_buf(),
            });
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let dest_template = slash_path(relative);
        let resolved = resolve_tokens(&dest_template, context)?;
        check_contained(&resolved)?;

        candidates.push(Candidate {
            source: entry.path().to_path_buf(),
            relative: relative.to_path_buf(),
            dest_template,
            resolved,
        });
    }

    Ok(candidates)
}

/// Compile the top-level file that resolves to the ignore file name, if any.
async fn load_ignore_rules(
    root: &Path,
    candidates: &[Candidate],
    settings: &Settings,
) -> Result<IgnoreRules> {
    let ignore_file = candidates.iter().find(|candidate| {
        candidate.relative.components().count() == 1 && candidate.resolved == settings.ignore_file
    });

    let Some(ignore_file) = ignore_file else {
        return Ok(IgnoreRules::empty());
    };

    let bytes = read(&ignore_file.source).await?;
    let text = String::from_utf8_lossy(&bytes);
    let rules = IgnoreRules::compile(root, &ignore_file.source, &text)?;
    debug!(
        file = %ignore_file.relative.display(),
        patterns = rules.len(),
        "loaded ignore rules"
    );
    Ok(rules)
}

fn apply_filter(filter: &Script, context: &DataContext, path: &str, included: bool) -> Result<bool> {
    let failed = |message: String| StampError::Filter {
        path: path.to_string(),
        message,
    };

    let result = filter
        .eval(
            context,
            &[
                ("path", Dynamic::from(path.to_string())),
                ("included", Dynamic::from(included)),
            ],
        )
        .map_err(failed)?;

    result
        .as_bool()
        .map_err(|found| failed(format!("filter must return a boolean, got {found}")))
}

fn check_contained(resolved: &str) -> Result<()> {
    let escapes = resolved.is_empty()
        || Path::new(resolved)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(StampError::PathEscape {
            path: resolved.to_string(),
        });
    }
    Ok(())
}

async fn read(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| StampError::Io {
        context: format!("reading {}", path.display()),
        source: e,
    })
}

/// A relative path with `/` separators regardless of platform.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
