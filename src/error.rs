#![allow(unused_assignments)]

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::derive::DerivationStage;

/// Boxed error returned by derivation functions and custom path filters.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error, Diagnostic)]
pub enum StampError {
    #[error("Failed to parse package configuration {path}")]
    #[diagnostic(help("Check the TOML syntax in the package's stamp.toml"))]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid prompt definition for '{name}': {reason}")]
    InvalidPrompt { name: String, reason: String },

    #[error("User prompts cannot start with '_' unless overriding special variables: {prompts}")]
    #[diagnostic(help("Rename '{name}' or define it as a derived field first"))]
    ReservedPrompt { name: String, prompts: String },

    #[error("Invalid script for '{name}': {message}")]
    #[diagnostic(help("Derived fields and filters are Rhai expressions"))]
    InvalidScript { name: String, message: String },

    #[error("Prompt overrides loading failed with: {source}")]
    #[diagnostic(help("Overrides must be a JSON object, e.g. --prompts '{{\"name\": \"demo\"}}'"))]
    OverridesParse {
        #[source]
        source: serde_json::Error,
    },

    #[error("Prompt overrides must be a JSON object, found: {found}")]
    OverridesNotObject { found: String },

    #[error("Unknown token: '{token}' for path: {template}")]
    #[diagnostic(help("Every {{{{token}}}} in a path must name a non-empty data field"))]
    UnknownToken { token: String, template: String },

    #[error("Forbidden template characters in: '{token}' for path: {template}")]
    MalformedToken { token: String, template: String },

    #[error("Derived field '{field}' ({stage}) failed: {source}")]
    Derivation {
        field: String,
        stage: DerivationStage,
        #[source]
        source: BoxError,
    },

    #[error("Destination field missing from prompts")]
    #[diagnostic(help("Answer the 'destination' prompt or pass it in --prompts"))]
    MissingDestination,

    #[error("Path: {path} already exists")]
    #[diagnostic(help("Choose a destination directory that does not exist yet"))]
    DestinationExists { path: PathBuf },

    #[error("Templates path '{path}' directory not found")]
    #[diagnostic(help("The package must contain the directory named by _templatesDir"))]
    TemplatesDirMissing { path: PathBuf },

    #[error("Templates path '{path}' exists, but is not a directory")]
    TemplatesDirNotADirectory { path: PathBuf },

    #[error("Source: {path} is not a file or directory")]
    UnsupportedEntry { path: PathBuf },

    #[error("Resolved path '{path}' escapes the destination directory")]
    PathEscape { path: String },

    #[error("Failed to render template {file}: {message}")]
    #[diagnostic(help("Check the <%= %> / <% %> syntax in the template"))]
    Render { file: PathBuf, message: String },

    #[error("Custom filter failed for '{path}': {message}")]
    Filter { path: String, message: String },

    #[error("Encountered {} file path conflict{} when resolving: {}", paths.len(), plural(paths.len()), paths.join(", "))]
    #[diagnostic(help("Two template files expand to the same destination path"))]
    PathConflict { paths: Vec<String> },

    #[error("Invalid ignore pattern in {path}")]
    IgnorePattern {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Prompt cancelled by user")]
    PromptCancelled,

    #[error("No value for prompt '{name}': {message}")]
    ValidationFailed { name: String, message: String },
}

pub type Result<T> = std::result::Result<T, StampError>;

fn plural(count: usize) -> &'static str {
    if count > 1 {
        "s"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_singular() {
        let err = StampError::PathConflict {
            paths: vec!["/tmp/out/out.js".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Encountered 1 file path conflict when resolving: /tmp/out/out.js"
        );
    }

    #[test]
    fn conflict_message_plural() {
        let err = StampError::PathConflict {
            paths: vec!["a.js".to_string(), "b.js".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Encountered 2 file path conflicts when resolving: a.js, b.js"
        );
    }
}
