//! Configuration commands.
//!
//! Configuration is loaded from TOML files and merged with environment variables
//! prefixed with `PENSIUN__`. For example, `PENSIUN__API__BASE_URL` will
//! override `api.base_url` in the TOML file.

use std::path::Path;

use pensiun_common::canonical::compute_settings_hash;
use pensiun_common::settings::Settings;

use crate::error::CliError;

/// Load, merge and validate configuration.
///
/// Returns the settings and their canonical TOML form.
pub(crate) fn load_and_merge_config(
    file: &Path,
    verbose: bool,
) -> Result<(Settings, String), CliError> {
    if verbose {
        eprintln!("Loading config from: {}", file.display());
        eprintln!("Environment variables with PENSIUN__ prefix will be merged");
    }

    let settings = Settings::from_file(file)?;
    let merged_toml = settings.to_canonical_toml()?;

    Ok((settings, merged_toml))
}

/// Loads settings, failing with a configuration error that names the file.
pub(crate) fn load_settings(file: &Path) -> Result<Settings, CliError> {
    Settings::from_file(file).map_err(|e| {
        CliError::Config(format!("{} ({})", e, file.display()))
    })
}

/// Validate configuration file.
pub fn validate(file: &Path, verbose: bool) -> Result<(), CliError> {
    let (settings, merged_toml) = load_and_merge_config(file, verbose)?;
    let hash = compute_settings_hash(&merged_toml);

    println!("Configuration is valid");
    println!("  File: {}", file.display());
    println!("  Hash: {}", hash);
    println!("  API base URL: {}", settings.api.base_url);
    println!(
        "  Signing: {} via {:?}",
        settings.signing.algorithm, settings.signing.transport
    );

    if verbose {
        let value: toml::Value = toml::from_str(&merged_toml)?;
        if let Some(table) = value.as_table() {
            println!("\nSections found:");
            for key in table.keys() {
                println!("  - [{}]", key);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    pub(crate) fn create_test_config(dir: &TempDir) -> PathBuf {
        let config_path = dir.path().join("pensiun.toml");
        fs::write(
            &config_path,
            r#"
[api]
base_url = "https://pensiun.example.go.id"

[signing]
algorithm = "HS256"
kid = "cli-test"
secret = "cli-test-shared-secret-0123456789"
issuer = "dashboard-admin"
"#,
        )
        .expect("should write config");
        config_path
    }

    #[test]
    fn test_validate_valid_config() {
        let dir = TempDir::new().expect("should create temp dir");
        let config_path = create_test_config(&dir);

        assert!(validate(&config_path, true).is_ok());
    }

    #[test]
    fn test_validate_invalid_toml() {
        let dir = TempDir::new().expect("should create temp dir");
        let config_path = dir.path().join("invalid.toml");
        fs::write(&config_path, "invalid { toml").expect("should write");

        assert!(validate(&config_path, false).is_err());
    }

    #[test]
    fn test_validate_missing_required_fields() {
        let dir = TempDir::new().expect("should create temp dir");
        let config_path = dir.path().join("incomplete.toml");
        fs::write(&config_path, "[api]\nbase_url = \"https://x.go.id\"\n").expect("should write");

        assert!(matches!(
            validate(&config_path, false),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn test_validate_nonexistent_file() {
        let dir = TempDir::new().expect("should create temp dir");
        assert!(validate(&dir.path().join("nonexistent.toml"), false).is_err());
    }

    #[test]
    fn test_load_settings_names_file() {
        let dir = TempDir::new().expect("should create temp dir");
        let missing = dir.path().join("missing.toml");
        match load_settings(&missing) {
            Err(CliError::Config(msg)) => assert!(msg.contains("missing.toml")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }
}
