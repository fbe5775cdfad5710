pub mod erb;
pub mod file;
pub mod ignore;
pub mod token;
pub mod walker;
pub mod writer;

use std::path::Path;

use tracing::trace;

use crate::context::DataContext;
use crate::error::Result;

pub use erb::ContentRenderer;
pub use file::{classify, is_binary, Classified};
pub use ignore::IgnoreRules;
pub use token::resolve_tokens;
pub use walker::{walk, TemplateEntry, WalkRequest};
pub use writer::{validate_unique, write_entries, Materialized};

/// Attach rendered content and the final destination to every entry.
pub fn render_entries(
    entries: &mut [TemplateEntry],
    destination: &Path,
    context: &DataContext,
    renderer: &ContentRenderer,
) -> Result<()> {
    for entry in entries.iter_mut() {
        let classified = classify(
            &entry.source,
            &entry.buffer,
            &entry.dest_template,
            context,
            renderer,
        )?;
        entry.dest = destination.join(&classified.dest);
        entry.content = classified.content;
        trace!(
            source = %entry.relative.display(),
            rendered = entry.is_rendered(),
            "classified"
        );
    }
    Ok(())
}
