//! Request signing.
//!
//! [`sign`] is the stateless primitive: canonical payload in, compact JWS out.
//! [`RequestSigner`] binds a key and kid together and signs whole HTTP
//! requests with [`RequestClaims`].

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canonical::compute_body_digest;
use crate::constants::CURRENT_KID_KEY;
use crate::error::PensiunError;
use crate::key_store::{FileKeyStore, KeyStore};
use crate::models::{Method, Payload};
use crate::settings::Settings;

use super::jwt::{JwtHelper, Signature};
use super::keys::{Algorithm, SigningKeyMaterial};

/// Signs a payload with a key.
///
/// The result is deterministic: the same payload and key always give the same
/// token, and field order in the payload does not matter.
///
/// # Errors
///
/// Returns an error if the payload cannot be canonicalized or signing fails.
pub fn sign(
    payload: &Payload,
    key: &SigningKeyMaterial,
) -> Result<Signature, Report<PensiunError>> {
    JwtHelper::sign(payload, key, None)
}

/// Signs a payload with raw key bytes, failing when the key is absent or malformed.
///
/// # Errors
///
/// Returns an error if `key_bytes` is empty or not a valid key for `algorithm`.
pub fn sign_with_key_bytes(
    payload: &Payload,
    algorithm: Algorithm,
    key_bytes: &[u8],
    kid: Option<&str>,
) -> Result<Signature, Report<PensiunError>> {
    let key = SigningKeyMaterial::from_bytes(algorithm, key_bytes)?;
    JwtHelper::sign(payload, &key, kid)
}

/// Claims describing one signed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestClaims {
    /// Client identifier.
    pub iss: String,
    /// Issued at, seconds since the epoch.
    pub iat: i64,
    /// Not before, equal to `iat`.
    pub nbf: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// Unique request id.
    pub jti: String,
    /// HTTP method.
    pub htm: String,
    /// Path and query of the target URL.
    pub htu: String,
    /// `sha256:<hex>` digest of the request body.
    pub bdh: String,
}

/// A request signature plus the claims it covers.
#[derive(Debug, Clone)]
pub struct SignedRequestParts {
    pub signature: Signature,
    pub claims: RequestClaims,
}

/// Signs payloads and requests with one key.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    key: SigningKeyMaterial,
    pub kid: String,
    pub issuer: String,
    pub ttl: Duration,
}

impl RequestSigner {
    pub fn new(
        key: SigningKeyMaterial,
        kid: impl Into<String>,
        issuer: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            key,
            kid: kid.into(),
            issuer: issuer.into(),
            ttl,
        }
    }

    /// Loads the signing key named by settings.
    ///
    /// Sources are tried in order: inline `secret`, `key_file`, then the key
    /// store's current kid under `key_store_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if no key source is configured, the kid is missing, or
    /// the key material is malformed.
    pub fn from_settings(settings: &Settings) -> Result<Self, Report<PensiunError>> {
        let signing = &settings.signing;
        let ttl = i64::try_from(signing.token_ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                Report::new(PensiunError::Configuration {
                    message: format!(
                        "signing.token_ttl_secs {} is out of range",
                        signing.token_ttl_secs
                    ),
                })
            })?;

        let inline_or_file = if let Some(secret) = &signing.secret {
            Some(SigningKeyMaterial::from_bytes(
                signing.algorithm,
                secret.as_bytes(),
            )?)
        } else if let Some(path) = &signing.key_file {
            Some(SigningKeyMaterial::from_key_file(signing.algorithm, path)?)
        } else {
            None
        };

        if let Some(key) = inline_or_file {
            let kid = signing.kid.clone().ok_or_else(|| {
                Report::new(PensiunError::Configuration {
                    message: "signing.kid is required with signing.secret or signing.key_file"
                        .into(),
                })
            })?;
            log::debug!("Loaded {} signing key for kid {}", key.algorithm(), kid);
            return Ok(Self::new(key, kid, signing.issuer.clone(), ttl));
        }

        let Some(dir) = &signing.key_store_dir else {
            return Err(Report::new(PensiunError::KeyMaterial {
                message: "No signing key configured \
                          (set signing.secret, signing.key_file or signing.key_store_dir)"
                    .into(),
            }));
        };

        let mut signer = Self::from_store_dir(dir, signing.algorithm, signing.kid.as_deref())?;
        signer.issuer.clone_from(&signing.issuer);
        signer.ttl = ttl;
        Ok(signer)
    }

    /// Loads a signer from a file backed key store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store has no usable key.
    pub fn from_store_dir(
        dir: &Path,
        algorithm: Algorithm,
        kid: Option<&str>,
    ) -> Result<Self, Report<PensiunError>> {
        let (public, secret) = FileKeyStore::pair(dir);
        Self::from_stores(&public, &secret, algorithm, kid)
    }

    /// Loads a signer from public and secret stores.
    ///
    /// Uses `kid` when given, otherwise the store's `current-kid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the kid or its secret is missing, or the secret is malformed.
    pub fn from_stores<P: KeyStore, S: KeyStore>(
        public: &P,
        secret: &S,
        algorithm: Algorithm,
        kid: Option<&str>,
    ) -> Result<Self, Report<PensiunError>> {
        let kid = match kid {
            Some(kid) => kid.to_string(),
            None => public
                .get_required(CURRENT_KID_KEY)
                .change_context(PensiunError::KeyMaterial {
                    message: "Failed to get current-kid".into(),
                })?,
        };

        let encoded = secret
            .get_required(&kid)
            .change_context(PensiunError::KeyMaterial {
                message: format!("Failed to get signing key for kid: {}", kid),
            })?;
        let key = SigningKeyMaterial::from_base64(algorithm, &encoded)
            .attach(format!("while loading signing key for kid: {}", kid))?;

        Ok(Self::new(key, kid, String::new(), Duration::minutes(5)))
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.key.algorithm()
    }

    #[must_use]
    pub fn key(&self) -> &SigningKeyMaterial {
        &self.key
    }

    /// Signs a payload. Deterministic for a given payload.
    ///
    /// # Errors
    ///
    /// Returns an error if canonicalization or signing fails.
    pub fn sign(&self, payload: &Payload) -> Result<Signature, Report<PensiunError>> {
        JwtHelper::sign(payload, &self.key, Some(&self.kid))
    }

    /// Signs one HTTP request.
    ///
    /// `path_and_query` is the URL path plus any query string. `body` is the
    /// exact byte sequence that will be sent (empty for bodiless requests).
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign_request(
        &self,
        method: Method,
        path_and_query: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<SignedRequestParts, Report<PensiunError>> {
        let claims = RequestClaims {
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            htm: method.as_str().to_string(),
            htu: path_and_query.to_string(),
            bdh: compute_body_digest(body),
        };

        let signature = JwtHelper::sign(&claims, &self.key, Some(&self.kid))?;
        log::debug!(
            "Signed {} {} with kid {} (jti {})",
            claims.htm,
            claims.htu,
            self.kid,
            claims.jti
        );

        Ok(SignedRequestParts { signature, claims })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_store::MemoryKeyStore;
    use crate::request_signing::{JwtHelper, Keypair, VerificationKey};
    use crate::test_support::tests::{crate_test_settings_str, create_test_settings};

    fn payload() -> Payload {
        Payload::new()
            .with("nomor_pensiun", "P-2024-000981")
            .with("nik", "3273010101800001")
    }

    fn ed25519_key() -> SigningKeyMaterial {
        SigningKeyMaterial::Ed25519(Keypair::generate().signing_key)
    }

    fn hmac_key() -> SigningKeyMaterial {
        SigningKeyMaterial::from_bytes(Algorithm::Hs256, b"pengecekan-shared-secret-0123456")
            .expect("should build key")
    }

    #[test]
    fn test_sign_is_deterministic() {
        for key in [ed25519_key(), hmac_key()] {
            let first = sign(&payload(), &key).expect("should sign");
            let second = sign(&payload(), &key).expect("should sign again");
            assert_eq!(first, second, "{} signatures should be deterministic", key.algorithm());
        }
    }

    #[test]
    fn test_sign_ignores_field_order() {
        let key = hmac_key();
        let reordered = Payload::new()
            .with("nik", "3273010101800001")
            .with("nomor_pensiun", "P-2024-000981");

        assert_eq!(
            sign(&payload(), &key).expect("should sign"),
            sign(&reordered, &key).expect("should sign")
        );
    }

    #[test]
    fn test_different_payloads_produce_different_signatures() {
        for key in [ed25519_key(), hmac_key()] {
            let a = sign(&payload(), &key).expect("should sign");
            let b = sign(&payload().with("nik", "3273010101800002"), &key).expect("should sign");
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_ed25519_signature_verifies_with_public_key() {
        let keypair = Keypair::generate();
        let key = SigningKeyMaterial::Ed25519(keypair.signing_key.clone());
        let token = sign(&payload(), &key).expect("should sign");

        let public = VerificationKey::Ed25519(keypair.verifying_key);
        let validation = JwtHelper::validation(&public, 0);
        let data = JwtHelper::decode(token.as_str(), &public, &validation)
            .expect("should decode")
            .expect("signature should match the public key");
        assert_eq!(data.claims, serde_json::to_value(payload()).expect("should serialize"));
    }

    #[test]
    fn test_missing_key_fails_explicitly() {
        let err = sign_with_key_bytes(&payload(), Algorithm::Hs256, b"", None)
            .expect_err("empty secret should fail");
        assert!(err.to_string().contains("Key material error"));

        assert!(sign_with_key_bytes(&payload(), Algorithm::EdDsa, b"", None).is_err());
        assert!(sign_with_key_bytes(&payload(), Algorithm::EdDsa, &[1u8; 5], None).is_err());
    }

    #[test]
    fn test_request_signer_from_settings_inline_secret() {
        let signer = RequestSigner::from_settings(&create_test_settings())
            .expect("should load signer from settings");

        assert_eq!(signer.kid, "test-kid");
        assert_eq!(signer.issuer, "dashboard-admin");
        assert_eq!(signer.algorithm(), Algorithm::Hs256);
        assert_eq!(signer.ttl, Duration::seconds(300));
    }

    #[test]
    fn test_request_signer_from_settings_without_key() {
        let toml_str = crate_test_settings_str().replace("secret = \"test-shared-secret\"", "");
        let settings = Settings::from_toml(&toml_str).expect("should parse settings");

        let err = RequestSigner::from_settings(&settings).expect_err("no key should fail");
        assert!(err.to_string().contains("No signing key configured"));
    }

    #[test]
    fn test_request_signer_from_settings_requires_kid() {
        let toml_str = crate_test_settings_str().replace("kid = \"test-kid\"", "");
        let settings = Settings::from_toml(&toml_str).expect("should parse settings");

        assert!(RequestSigner::from_settings(&settings).is_err());
    }

    #[test]
    fn test_request_signer_from_stores() {
        let public = MemoryKeyStore::new();
        let secret = MemoryKeyStore::new();
        let key = ed25519_key();
        public.put(CURRENT_KID_KEY, "pk-2026-10-01").expect("should put kid");
        secret
            .put("pk-2026-10-01", &key.to_base64())
            .expect("should put key");

        let signer = RequestSigner::from_stores(&public, &secret, Algorithm::EdDsa, None)
            .expect("should load signer");
        assert_eq!(signer.kid, "pk-2026-10-01");
        assert_eq!(
            signer.sign(&payload()).expect("should sign"),
            JwtHelper::sign(&payload(), &key, Some("pk-2026-10-01")).expect("should sign")
        );
    }

    #[test]
    fn test_request_signer_from_empty_store_fails() {
        let public = MemoryKeyStore::new();
        let secret = MemoryKeyStore::new();
        assert!(RequestSigner::from_stores(&public, &secret, Algorithm::EdDsa, None).is_err());
    }

    #[test]
    fn test_sign_request_claims() {
        let signer = RequestSigner::new(hmac_key(), "kid-1", "dashboard", Duration::seconds(120));
        let now = DateTime::from_timestamp(1_760_000_000, 0).expect("valid timestamp");
        let body = br#"{"nik":"1"}"#;

        let parts = signer
            .sign_request(Method::Post, "/api/pengecekan", body, now)
            .expect("should sign request");

        assert_eq!(parts.claims.iss, "dashboard");
        assert_eq!(parts.claims.iat, 1_760_000_000);
        assert_eq!(parts.claims.nbf, 1_760_000_000);
        assert_eq!(parts.claims.exp, 1_760_000_120);
        assert_eq!(parts.claims.htm, "POST");
        assert_eq!(parts.claims.htu, "/api/pengecekan");
        assert_eq!(parts.claims.bdh, compute_body_digest(body));
        assert!(Uuid::parse_str(&parts.claims.jti).is_ok());

        let (header, algorithm) =
            JwtHelper::header(parts.signature.as_str()).expect("should read header");
        assert_eq!(header.kid.as_deref(), Some("kid-1"));
        assert_eq!(algorithm, Algorithm::Hs256);

        let verification = hmac_key().verification_key();
        let data = JwtHelper::decode(
            parts.signature.as_str(),
            &verification,
            &JwtHelper::validation(&verification, 0),
        )
        .expect("should decode")
        .expect("signature should match");
        let claims: RequestClaims =
            serde_json::from_value(data.claims).expect("should parse claims");
        assert_eq!(claims, parts.claims);
    }
}
