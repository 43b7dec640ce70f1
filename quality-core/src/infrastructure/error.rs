// quality-core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    // --- FILESYSTEM (IO) ---
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(quality::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(#[from] std::io::Error),

    // --- CONFIG / YAML ---
    #[error("YAML Parsing Error: {0}")]
    #[diagnostic(
        code(quality::infra::yaml),
        help("Check your YAML syntax (indentation, types).")
    )]
    YamlError(#[from] serde_yaml::Error),

    #[error("Configuration Error: {0}")]
    #[diagnostic(code(quality::infra::config))]
    ConfigError(String),

    #[error("Engine configuration not found at '{0}'")]
    #[diagnostic(code(quality::infra::config_missing))]
    ConfigNotFound(String),

    #[error("Rule catalog Error: {0}")]
    #[diagnostic(
        code(quality::infra::catalog),
        help("Each rule needs a unique id, an expression and a dimension.")
    )]
    CatalogError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
