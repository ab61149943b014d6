//! Hash computation for configuration files.

use std::fs;
use std::path::Path;

use pensiun_common::canonical::compute_settings_hash;

use crate::config::load_and_merge_config;
use crate::error::CliError;
use crate::OutputFormat;

/// Compute SHA-256 hash of a configuration file.
///
/// Line endings are normalized to LF for consistent hashing across platforms.
pub fn compute_file_hash(path: &Path) -> Result<String, CliError> {
    let content = fs::read_to_string(path)?;
    Ok(compute_settings_hash(&content))
}

/// Compute and display the hash of a configuration file.
pub fn compute_and_display(
    path: &Path,
    format: &OutputFormat,
    raw: bool,
    verbose: bool,
) -> Result<(), CliError> {
    let hash = if raw {
        compute_file_hash(path)?
    } else {
        let (_settings, merged_toml) = load_and_merge_config(path, verbose)?;
        compute_settings_hash(&merged_toml)
    };

    match format {
        OutputFormat::Text => {
            println!("{}", hash);
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "file": path.display().to_string(),
                "hash": hash,
                "algorithm": "sha256"
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::create_test_config;
    use tempfile::TempDir;

    #[test]
    fn test_compute_file_hash() {
        let dir = TempDir::new().expect("should create temp dir");
        let path = create_test_config(&dir);

        let hash = compute_file_hash(&path).expect("should hash");
        assert!(hash.starts_with("sha256:"));
        assert_eq!(hash.len(), 7 + 64);
    }

    #[test]
    fn test_merged_hash_ignores_formatting() {
        let dir = TempDir::new().expect("should create temp dir");
        let path = create_test_config(&dir);
        let spaced = dir.path().join("spaced.toml");
        let content = fs::read_to_string(&path).expect("should read");
        fs::write(&spaced, content.replace(" = ", "   =   ")).expect("should write");

        let (_, a) = load_and_merge_config(&path, false).expect("should load");
        let (_, b) = load_and_merge_config(&spaced, false).expect("should load");
        assert_eq!(compute_settings_hash(&a), compute_settings_hash(&b));
        assert_ne!(
            compute_file_hash(&path).expect("should hash"),
            compute_file_hash(&spaced).expect("should hash")
        );
    }

    #[test]
    fn test_compute_and_display_json() {
        let dir = TempDir::new().expect("should create temp dir");
        let path = create_test_config(&dir);
        assert!(compute_and_display(&path, &OutputFormat::Json, false, false).is_ok());
        assert!(compute_and_display(&path, &OutputFormat::Text, true, false).is_ok());
    }
}
