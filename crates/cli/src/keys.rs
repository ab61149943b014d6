//! Key management commands over a file backed key store.

use std::fs;
use std::io::Write;
use std::path::Path;

use pensiun_common::key_store::FileKeyStore;
use pensiun_common::request_signing::{
    get_active_jwks, Algorithm, DiscoveryDocument, KeyRotationManager, Keypair,
    SigningKeyMaterial,
};
use pensiun_common::settings::Signing;
use rand::rngs::OsRng;
use rand::RngCore;
use tempfile::NamedTempFile;

use crate::error::CliError;

fn manager(store: &Path) -> KeyRotationManager<FileKeyStore, FileKeyStore> {
    let (public, secret) = FileKeyStore::pair(store);
    KeyRotationManager::new(public, secret)
}

/// Writes a standalone key to `out` and prints the public JWK for Ed25519 keys.
pub fn generate(
    algorithm: Algorithm,
    kid: &str,
    out: &Path,
    force: bool,
) -> Result<(), CliError> {
    if out.exists() && !force {
        return Err(CliError::Input(format!(
            "{} already exists, pass --force to overwrite",
            out.display()
        )));
    }

    let key = match algorithm {
        Algorithm::EdDsa => SigningKeyMaterial::Ed25519(Keypair::generate().signing_key),
        Algorithm::Hs256 => {
            let mut secret = [0u8; 32];
            OsRng.fill_bytes(&mut secret);
            // HS256 key files are used verbatim, so the base64 text is the secret.
            let text = SigningKeyMaterial::from_bytes(Algorithm::Hs256, &secret)?.to_base64();
            SigningKeyMaterial::from_bytes(Algorithm::Hs256, text.as_bytes())?
        }
    };

    let encoded = match &key {
        SigningKeyMaterial::Ed25519(_) => key.to_base64(),
        SigningKeyMaterial::Hmac(secret) => {
            String::from_utf8_lossy(secret.as_bytes()).into_owned()
        }
    };
    write_private(out, &encoded)?;
    eprintln!("Wrote {} key to {}", algorithm, out.display());

    if let SigningKeyMaterial::Ed25519(signing_key) = &key {
        let jwk = Keypair::from_signing_key(signing_key.clone()).get_jwk(kid.to_string());
        println!("{}", serde_json::to_string_pretty(&jwk)?);
    }

    Ok(())
}

/// Writes `content` to a 0600 temp file next to `path`, then renames it over `path`.
fn write_private(path: &Path, content: &str) -> Result<(), CliError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    writeln!(file, "{}", content)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Rotates to a fresh Ed25519 key.
pub fn rotate(store: &Path, kid: Option<String>) -> Result<(), CliError> {
    let result = manager(store).rotate_key(kid)?;

    println!("New kid: {}", result.new_kid);
    if let Some(previous) = &result.previous_kid {
        println!("Previous kid: {}", previous);
    }
    println!("Active kids: {}", result.active_kids.join(", "));
    if !result.retired_kids.is_empty() {
        println!("Retired kids: {}", result.retired_kids.join(", "));
    }
    println!("{}", serde_json::to_string_pretty(&result.jwk)?);
    Ok(())
}

/// Lists active kids, marking the current one and shared secrets.
pub fn list(store: &Path) -> Result<(), CliError> {
    let manager = manager(store);
    let current = manager.current_kid()?;

    for kid in manager.list_active_keys()? {
        let marker = if current.as_deref() == Some(kid.as_str()) {
            " (current)"
        } else {
            ""
        };
        println!("{}{}", kid, marker);
    }
    for kid in manager.list_active_secrets()? {
        println!("{} (HS256)", kid);
    }
    Ok(())
}

pub fn deactivate(store: &Path, kid: &str) -> Result<(), CliError> {
    manager(store).deactivate_key(kid)?;
    println!("Deactivated {}", kid);
    Ok(())
}

pub fn delete(store: &Path, kid: &str) -> Result<(), CliError> {
    manager(store).delete_key(kid)?;
    println!("Deleted {}", kid);
    Ok(())
}

/// Stores an HS256 shared secret read from a file.
pub fn add_secret(store: &Path, kid: &str, secret_file: &Path) -> Result<(), CliError> {
    let secret = fs::read(secret_file)?;
    manager(store).store_shared_secret(kid, secret.trim_ascii())?;
    println!("Stored shared secret {}", kid);
    Ok(())
}

/// Prints the active JWKS, or the full discovery document.
pub fn jwks(store: &Path, discovery: Option<&Signing>) -> Result<(), CliError> {
    let (public, _secret) = FileKeyStore::pair(store);

    let output = match discovery {
        Some(signing) => DiscoveryDocument::from_store(&public, signing)?.to_json_pretty()?,
        None => {
            let jwks: serde_json::Value = serde_json::from_str(&get_active_jwks(&public)?)?;
            serde_json::to_string_pretty(&jwks)?
        }
    };
    println!("{}", output);
    Ok(())
}
