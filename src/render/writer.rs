use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::walker::TemplateEntry;
use crate::error::{Result, StampError};

/// The outcome of a completed write.
#[derive(Debug)]
pub struct Materialized {
    pub destination: PathBuf,
    pub files: Vec<TemplateEntry>,
}

impl Materialized {
    pub fn rendered_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_rendered()).count()
    }

    pub fn copied_count(&self) -> usize {
        self.files.len() - self.rendered_count()
    }
}

/// Fail if two entries resolve to the same destination.
///
/// Every colliding destination is reported, in the order first seen.
pub fn validate_unique(entries: &[TemplateEntry]) -> Result<()> {
    let mut by_dest: IndexMap<&Path, usize> = IndexMap::new();
    for entry in entries {
        *by_dest.entry(entry.dest.as_path()).or_default() += 1;
    }

    let paths: Vec<String> = by_dest
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(dest, _)| dest.display().to_string())
        .collect();

    if paths.is_empty() {
        Ok(())
    } else {
        Err(StampError::PathConflict { paths })
    }
}

/// Write every entry below `destination`, one at a time.
///
/// Files already written stay in place if a later write fails.
pub async fn write_entries(
    destination: &Path,
    entries: Vec<TemplateEntry>,
) -> Result<Materialized> {
    create_dir(destination).await?;

    for entry in &entries {
        if let Some(parent) = entry.dest.parent() {
            create_dir(parent).await?;
        }
        tokio::fs::write(&entry.dest, entry.bytes())
            .await
            .map_err(|e| StampError::Io {
                context: format!("writing {}", entry.dest.display()),
                source: e,
            })?;
        trace!(dest = %entry.dest.display(), rendered = entry.is_rendered(), "wrote file");
    }

    debug!(files = entries.len(), destination = %destination.display(), "materialized");
    Ok(Materialized {
        destination: destination.to_path_buf(),
        files: entries,
    })
}

async fn create_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| StampError::Io {
            context: format!("creating directory {}", path.display()),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(relative: &str, dest: &Path, content: Option<&str>) -> TemplateEntry {
        TemplateEntry {
            source: PathBuf::from("/pkg/templates").join(relative),
            relative: PathBuf::from(relative),
            dest_template: relative.to_string(),
            dest: dest.to_path_buf(),
            buffer: b"raw".to_vec(),
            content: content.map(str::to_string),
        }
    }

    #[test]
    fn test_unique_entries_pass() {
        let out = Path::new("/out");
        let entries = vec![
            entry("a.txt", &out.join("a.txt"), None),
            entry("b.txt", &out.join("b.txt"), None),
        ];
        assert!(validate_unique(&entries).is_ok());
    }

    #[test]
    fn test_conflicts_listed_once_in_order() {
        let out = Path::new("/out");
        let entries = vec![
            entry("{{a}}.js", &out.join("out.js"), None),
            entry("x.txt", &out.join("x.txt"), None),
            entry("{{b}}.js", &out.join("out.js"), None),
            entry("{{c}}.txt", &out.join("x.txt"), None),
            entry("{{d}}.js", &out.join("out.js"), None),
        ];
        match validate_unique(&entries) {
            Err(StampError::PathConflict { paths }) => assert_eq!(
                paths,
                vec![
                    out.join("out.js").display().to_string(),
                    out.join("x.txt").display().to_string(),
                ]
            ),
            other => panic!("expected PathConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_entries() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let entries = vec![
            entry("a.txt", &out.join("a.txt"), Some("rendered")),
            entry("deep/b.bin", &out.join("deep/nested/b.bin"), None),
        ];

        let result = write_entries(&out, entries).await.unwrap();
        assert_eq!(result.rendered_count(), 1);
        assert_eq!(result.copied_count(), 1);
        assert_eq!(std::fs::read_to_string(out.join("a.txt")).unwrap(), "rendered");
        assert_eq!(std::fs::read(out.join("deep/nested/b.bin")).unwrap(), b"raw");
    }

    #[tokio::test]
    async fn test_write_empty_creates_destination() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("empty");
        let result = write_entries(&out, Vec::new()).await.unwrap();
        assert!(out.is_dir());
        assert!(result.files.is_empty());
    }
}
