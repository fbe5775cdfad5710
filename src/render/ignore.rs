use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{Result, StampError};

/// Gitignore-style exclusion rules for a template tree.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    matcher: Gitignore,
}

impl IgnoreRules {
    /// Compile the text of an ignore file whose patterns are relative to `root`.
    pub fn compile(root: &Path, source: &Path, text: &str) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        for line in text.lines() {
            builder
                .add_line(Some(source.to_path_buf()), line)
                .map_err(|e| invalid(source, e))?;
        }
        let matcher = builder.build().map_err(|e| invalid(source, e))?;
        Ok(Self { matcher })
    }

    /// Rules that accept everything.
    pub fn empty() -> Self {
        Self {
            matcher: Gitignore::empty(),
        }
    }

    /// Whether `relative` (a file path under the root) is kept. A file inside
    /// an ignored directory is not.
    pub fn accepts(&self, relative: &Path) -> bool {
        !self
            .matcher
            .matched_path_or_any_parents(relative, false)
            .is_ignore()
    }

    pub fn len(&self) -> usize {
        self.matcher.num_ignores() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn invalid(source: &Path, error: ignore::Error) -> StampError {
    StampError::IgnorePattern {
        path: PathBuf::from(source),
        source: error,
    }
}
