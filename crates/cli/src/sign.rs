//! Offline signing and verification commands.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use chrono::Duration;
use pensiun_common::key_store::FileKeyStore;
use pensiun_common::models::{Method, Payload};
use pensiun_common::request_signing::{
    KeyResolver, RequestSigner, SignatureVerifier, SingleKeyResolver, StoreKeyResolver,
};
use pensiun_common::settings::Settings;

use crate::error::CliError;

/// Reads a JSON object payload from a file, or stdin when `path` is `-`.
pub(crate) fn read_payload(path: &Path) -> Result<Payload, CliError> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(path)?
    };
    Ok(Payload::from_json_str(&text)?)
}

/// Signs a payload and prints the compact token.
pub fn sign(settings: &Settings, payload_path: &Path) -> Result<(), CliError> {
    let payload = read_payload(payload_path)?;
    let signer = RequestSigner::from_settings(settings)?;
    let token = signer.sign(&payload)?;

    log::debug!("Signed payload with kid {} ({})", signer.kid, signer.algorithm());
    println!("{}", token);
    Ok(())
}

/// Signed request details to check against the token claims.
pub struct RequestTarget<'a> {
    pub method: Method,
    pub path_and_query: &'a str,
}

/// Verifies `token` against a payload, or against a full request when `target` is set.
pub fn verify(
    settings: &Settings,
    payload_path: &Path,
    token: &str,
    target: Option<RequestTarget<'_>>,
) -> Result<(), CliError> {
    let payload = read_payload(payload_path)?;
    let skew = clock_skew(settings)?;

    match &settings.signing.key_store_dir {
        Some(dir) => {
            let (public, secret) = FileKeyStore::pair(dir);
            let resolver = StoreKeyResolver::new(public, Some(secret));
            verify_with(SignatureVerifier::new(resolver, skew), &payload, token, target)
        }
        None => {
            let signer = RequestSigner::from_settings(settings)?;
            let resolver =
                SingleKeyResolver::new(signer.kid.clone(), signer.key().verification_key());
            verify_with(SignatureVerifier::new(resolver, skew), &payload, token, target)
        }
    }
}

fn clock_skew(settings: &Settings) -> Result<Duration, CliError> {
    i64::try_from(settings.signing.max_clock_skew_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| CliError::Config("signing.max_clock_skew_secs is out of range".into()))
}

fn verify_with<R: KeyResolver>(
    verifier: SignatureVerifier<R>,
    payload: &Payload,
    token: &str,
    target: Option<RequestTarget<'_>>,
) -> Result<(), CliError> {
    match target {
        Some(target) => {
            // Same body the client signs: none for GET/DELETE, the canonical
            // payload (even `{}`) otherwise.
            let body = if target.method.has_body() {
                payload.to_canonical_json()?.into_bytes()
            } else {
                Vec::new()
            };
            let claims =
                verifier.verify_request(target.method, target.path_and_query, &body, token)?;
            println!("Signature is valid");
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
        None => {
            if !verifier.verify_payload(payload, token)? {
                return Err(CliError::Verification(
                    "signature does not match the payload".into(),
                ));
            }
            println!("Signature is valid");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::config::load_settings;
    use crate::config::tests::create_test_config;
    use tempfile::TempDir;

    fn write_payload(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("payload.json");
        fs::write(&path, content).expect("should write payload");
        path
    }

    fn token_for(settings: &Settings, payload: &Path) -> String {
        let payload = read_payload(payload).expect("should read payload");
        RequestSigner::from_settings(settings)
            .expect("should build signer")
            .sign(&payload)
            .expect("should sign")
            .into_string()
    }

    #[test]
    fn test_read_payload_rejects_non_object() {
        let dir = TempDir::new().expect("should create temp dir");
        let path = write_payload(&dir, "[1, 2, 3]");
        assert!(read_payload(&path).is_err());
    }

    #[test]
    fn test_sign_then_verify() {
        let dir = TempDir::new().expect("should create temp dir");
        let settings = load_settings(&create_test_config(&dir)).expect("should load settings");
        let payload = write_payload(&dir, r#"{"nip": "196501011990031001", "nama": "Budi"}"#);

        sign(&settings, &payload).expect("should sign");
        let token = token_for(&settings, &payload);
        verify(&settings, &payload, &token, None).expect("should verify");
    }

    #[test]
    fn test_verify_detects_tampering() {
        let dir = TempDir::new().expect("should create temp dir");
        let settings = load_settings(&create_test_config(&dir)).expect("should load settings");
        let payload = write_payload(&dir, r#"{"nip": "196501011990031001"}"#);
        let token = token_for(&settings, &payload);

        let tampered = write_payload(&dir, r#"{"nip": "196501011990031002"}"#);
        assert!(matches!(
            verify(&settings, &tampered, &token, None),
            Err(CliError::Verification(_))
        ));
    }

    #[test]
    fn test_verify_request_target() {
        let dir = TempDir::new().expect("should create temp dir");
        let settings = load_settings(&create_test_config(&dir)).expect("should load settings");
        let payload_path = write_payload(&dir, r#"{"nip": "196501011990031001"}"#);
        let payload = read_payload(&payload_path).expect("should read payload");

        let signer = RequestSigner::from_settings(&settings).expect("should build signer");
        let body = payload.to_canonical_json().expect("should canonicalize");
        let parts = signer
            .sign_request(Method::Post, "/api/pengecekan", body.as_bytes(), Utc::now())
            .expect("should sign request");
        let token = parts.signature.into_string();

        let target = RequestTarget {
            method: Method::Post,
            path_and_query: "/api/pengecekan",
        };
        verify(&settings, &payload_path, &token, Some(target)).expect("should verify request");

        let wrong_path = RequestTarget {
            method: Method::Post,
            path_and_query: "/api/pengajuan",
        };
        assert!(matches!(
            verify(&settings, &payload_path, &token, Some(wrong_path)),
            Err(CliError::Verification(_))
        ));
    }

    #[test]
    fn test_verify_request_target_with_empty_payload() {
        let dir = TempDir::new().expect("should create temp dir");
        let settings = load_settings(&create_test_config(&dir)).expect("should load settings");
        let payload_path = write_payload(&dir, "{}");
        let signer = RequestSigner::from_settings(&settings).expect("should build signer");

        // POST with an empty object payload signs the `{}` body
        let post = signer
            .sign_request(Method::Post, "/api/pengecekan", b"{}", Utc::now())
            .expect("should sign request");
        let target = RequestTarget {
            method: Method::Post,
            path_and_query: "/api/pengecekan",
        };
        verify(&settings, &payload_path, post.signature.as_str(), Some(target))
            .expect("POST with {} should verify");

        // GET signs no body at all
        let get = signer
            .sign_request(Method::Get, "/api/users", b"", Utc::now())
            .expect("should sign request");
        let target = RequestTarget {
            method: Method::Get,
            path_and_query: "/api/users",
        };
        verify(&settings, &payload_path, get.signature.as_str(), Some(target))
            .expect("GET should verify");
    }
}
