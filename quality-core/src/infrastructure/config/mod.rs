// quality-core/src/infrastructure/config/mod.rs

use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::domain::configuration::EngineConfig;
use crate::error::QualityError;
use crate::infrastructure::error::InfrastructureError;

const CONFIG_CANDIDATES: [&str; 2] = ["quality_engine.yaml", "quality.yaml"];

/// Loads the engine configuration from a directory, then applies `QUALITY_*` environment overrides.
#[instrument(skip(config_dir))]
pub fn load_engine_config(config_dir: &Path) -> Result<EngineConfig, QualityError> {
    // 1. Discovery
    let config_path = find_config(config_dir)?;
    load_engine_config_from(&config_path)
}

#[instrument]
pub fn load_engine_config_from(config_path: &Path) -> Result<EngineConfig, QualityError> {
    info!(path = ?config_path, "Loading engine configuration");

    // 2. YAML base (missing sections fall back to defaults)
    let config = read_config(config_path)?;

    // 3. Environment layering
    let config = apply_env_overrides(config, |key| std::env::var(key).ok())?;

    // 4. Invariants (weights, bounds)
    Ok(config.validated()?)
}

fn find_config(root: &Path) -> Result<PathBuf, InfrastructureError> {
    for filename in CONFIG_CANDIDATES {
        let p = root.join(filename);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(InfrastructureError::ConfigNotFound(format!(
        "No configuration file found in {:?}. Checked: {:?}",
        root, CONFIG_CANDIDATES
    )))
}

fn read_config(path: &Path) -> Result<EngineConfig, InfrastructureError> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read engine config at {:?}", path))?;
    if content.trim().is_empty() {
        warn!(path = ?path, "Empty engine configuration, using defaults");
        return Ok(EngineConfig::default());
    }
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse engine config YAML at {:?}", path))
        .map_err(Into::into)
}

/// `lookup` abstracts the environment so overrides stay testable.
pub fn apply_env_overrides(
    mut config: EngineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<EngineConfig, InfrastructureError> {
    if let Some(val) = parse_var::<usize>(&lookup, "QUALITY_MAX_IN_FLIGHT")? {
        info!(old = config.validation.max_in_flight, new = val, "Overriding max in-flight chunks via ENV");
        config.validation.max_in_flight = val;
    }
    if let Some(val) = parse_var::<usize>(&lookup, "QUALITY_PARALLEL_THRESHOLD")? {
        info!(old = config.validation.parallel_threshold, new = val, "Overriding parallel threshold via ENV");
        config.validation.parallel_threshold = val;
    }
    if let Some(val) = parse_var::<usize>(&lookup, "QUALITY_CHUNK_SIZE")? {
        info!(old = config.validation.chunk_size, new = val, "Overriding chunk size via ENV");
        config.validation.chunk_size = val;
    }
    if let Some(val) = parse_var::<u64>(&lookup, "QUALITY_BATCH_DEADLINE_MS")? {
        info!(old = ?config.validation.batch_deadline_ms, new = val, "Overriding batch deadline via ENV");
        config.validation.batch_deadline_ms = Some(val);
    }
    if let Some(val) = parse_var::<bool>(&lookup, "QUALITY_AUDIT_ENABLED")? {
        info!(old = config.audit.enabled, new = val, "Overriding audit switch via ENV");
        config.audit.enabled = val;
    }
    Ok(config)
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, InfrastructureError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            InfrastructureError::ConfigError(format!("{key}='{raw}' is not a valid value"))
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_load_partial_yaml_keeps_defaults() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("quality_engine.yaml"),
            "validation:\n  max_in_flight: 4\n  chunk_size: 250\nscoring:\n  compliance_threshold: 80\n",
        )?;

        let config = load_engine_config(dir.path())?;
        assert_eq!(config.validation.max_in_flight, 4);
        assert_eq!(config.validation.chunk_size, 250);
        assert_eq!(config.validation.parallel_threshold, 1000);
        assert_eq!(config.scoring.compliance_threshold, 80.0);
        assert!(config.audit.enabled);
        Ok(())
    }

    #[test]
    fn test_fallback_file_name() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("quality.yaml"), "")?;
        let config = load_engine_config(dir.path())?;
        assert_eq!(config.validation.max_in_flight, 8);
        Ok(())
    }

    #[test]
    fn test_missing_config() {
        let dir = tempdir().unwrap();
        let err = load_engine_config(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            QualityError::Infrastructure(InfrastructureError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn test_bad_weights_rejected() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("quality_engine.yaml");
        fs::write(&path, "scoring:\n  weights:\n    completeness: 0.9\n")?;
        let err = load_engine_config_from(&path).unwrap_err();
        assert!(matches!(err, QualityError::Domain(_)));
        Ok(())
    }

    #[test]
    fn test_malformed_yaml() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("quality_engine.yaml");
        fs::write(&path, "validation: [unterminated")?;
        assert!(load_engine_config_from(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_env_overrides() -> anyhow::Result<()> {
        let config = apply_env_overrides(
            EngineConfig::default(),
            env(&[
                ("QUALITY_MAX_IN_FLIGHT", "16"),
                ("QUALITY_BATCH_DEADLINE_MS", "2500"),
                ("QUALITY_AUDIT_ENABLED", "false"),
            ]),
        )?;
        assert_eq!(config.validation.max_in_flight, 16);
        assert_eq!(config.validation.batch_deadline_ms, Some(2500));
        assert!(!config.audit.enabled);
        assert_eq!(config.validation.parallel_threshold, 1000);
        Ok(())
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let err = apply_env_overrides(
            EngineConfig::default(),
            env(&[("QUALITY_CHUNK_SIZE", "lots")]),
        )
        .unwrap_err();
        assert!(matches!(err, InfrastructureError::ConfigError(_)));
    }
}
