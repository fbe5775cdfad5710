use std::path::Path;

use console::style;
use miette::Result;

use stamp::check::check_package;
use stamp::config::Settings;

pub async fn run(package: String) -> Result<()> {
    let package_dir = Path::new(&package);
    let settings = Settings::default();

    println!(
        "{} {}",
        style("Checking package at").bold(),
        style(package_dir.display()).cyan()
    );

    let result = check_package(package_dir, &settings).await?;

    println!(
        "  Config: {}",
        if result.has_config {
            settings.config_file.as_str()
        } else {
            "none"
        }
    );
    println!("  Prompts: {}", result.prompt_count);
    println!("  Derived fields: {}", result.derived_count);
    println!("  Template files: {}", result.template_count);

    if !result.warnings.is_empty() {
        println!("\n{}", style("Warnings:").yellow().bold());
        for w in &result.warnings {
            println!("  {} {}", style("⚠").yellow(), w);
        }
    }

    if !result.errors.is_empty() {
        println!("\n{}", style("Errors:").red().bold());
        for e in &result.errors {
            println!("  {} {}", style("✗").red(), e);
        }
        println!(
            "\n{} Package has {} error(s)",
            style("✗").red().bold(),
            result.errors.len()
        );
        std::process::exit(1);
    } else {
        println!("\n{} Package is valid!", style("✓").green().bold());
    }

    Ok(())
}
