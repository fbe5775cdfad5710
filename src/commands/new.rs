use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;
use miette::Result;

use stamp::config::load_user_config;
use stamp::derive::DerivationGroup;
use stamp::prompt::{DefaultsPrompter, InquirePrompter, Prompter};
use stamp::script::create_engine;
use stamp::InflateOptions;

pub async fn run(
    package: String,
    prompts: Option<String>,
    defaults: bool,
    dry_run: bool,
    verbose: bool,
) -> Result<()> {
    let caller = match load_user_config()? {
        Some(user) => user.caller_group(Arc::new(create_engine()))?,
        None => DerivationGroup::caller(),
    };

    let mut options = InflateOptions::new(PathBuf::from(package)).with_caller(caller);
    options.overrides = prompts;

    let prompter: Box<dyn Prompter> = if defaults {
        Box::new(DefaultsPrompter)
    } else {
        Box::new(InquirePrompter)
    };

    let plan = stamp::plan_inflation(&options, prompter.as_ref()).await?;

    if dry_run {
        println!(
            "\n{} Dry run: files that would be written to {}:",
            style("==>").cyan().bold(),
            style(plan.destination.display()).cyan()
        );

        for entry in &plan.entries {
            let action = if entry.is_rendered() { "render" } else { "copy  " };
            let shown = entry
                .dest
                .strip_prefix(&plan.destination)
                .unwrap_or(&entry.dest);
            println!("  {} {}", style(action).green(), shown.display());

            if verbose {
                println!("  {}", style("──────").dim());
                match &entry.content {
                    Some(content) => {
                        for line in content.lines() {
                            println!("  {}", line);
                        }
                    }
                    None => println!(
                        "  {}",
                        style(format!("[unchanged, {} bytes]", entry.buffer.len())).dim()
                    ),
                }
                println!("  {}", style("──────").dim());
                println!();
            }
        }

        let rendered = plan.entries.iter().filter(|e| e.is_rendered()).count();
        println!(
            "\nSummary: {} rendered, {} copied",
            rendered,
            plan.entries.len() - rendered
        );
        println!("\n{} Dry run: no files written.", style("\u{2139}").blue().bold());
        return Ok(());
    }

    let result = stamp::execute_inflation(plan).await?;

    println!(
        "\n{} Project created at {}",
        style("\u{2713}").green().bold(),
        style(result.destination.display()).cyan()
    );
    println!(
        "  {} files rendered, {} files copied",
        result.rendered_count(),
        result.copied_count()
    );

    let cwd = std::env::current_dir().unwrap_or_default();
    println!("\n{}", style("Wrote files:").bold());
    for file in &result.files {
        println!("  - {}", relative_to(&file.dest, &cwd).display());
    }

    Ok(())
}

/// `path` relative to `base` when it lies below it, otherwise unchanged.
fn relative_to<'a>(path: &'a Path, base: &Path) -> &'a Path {
    path.strip_prefix(base).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_to_cwd() {
        let cwd = Path::new("/work");
        assert_eq!(
            relative_to(Path::new("/work/app/src/main.js"), cwd),
            Path::new("app/src/main.js")
        );
        assert_eq!(
            relative_to(Path::new("/elsewhere/app.js"), cwd),
            Path::new("/elsewhere/app.js")
        );
    }
}
