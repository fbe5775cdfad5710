use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stamp",
    about = "Materialize new projects from template packages",
    version
)]
pub struct Cli {
    /// Show debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new project from a template package
    New {
        /// Path to the unpacked template package
        package: String,

        /// Answers as a JSON object, skipping the prompts
        #[arg(long, value_name = "JSON")]
        prompts: Option<String>,

        /// Use default values without prompting
        #[arg(long)]
        defaults: bool,

        /// Show the files that would be written without writing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate a template package
    Check {
        /// Path to the package to check (default: current directory)
        #[arg(default_value = ".")]
        package: String,
    },
}
