//! Signing and verification key material.
//!
//! Two algorithms are supported:
//! - `EdDSA`: Ed25519 keypairs. The public half is published as a JWK.
//! - `HS256`: HMAC-SHA256 over a shared secret.
//!
//! Both produce deterministic signatures for identical input and key. The
//! material converts into `jsonwebtoken` encoding and decoding keys.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use base64::{engine::general_purpose, Engine};
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::{SigningKey, VerifyingKey};
use error_stack::{Report, ResultExt};
use jsonwebtoken::{DecodingKey, EncodingKey};
use serde::{Deserialize, Serialize};

use crate::error::PensiunError;

const ED25519_KEY_LENGTH: usize = 32;
const RECOMMENDED_HMAC_SECRET_LENGTH: usize = 32;

/// JWS algorithm identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[default]
    #[serde(rename = "EdDSA")]
    EdDsa,
    #[serde(rename = "HS256")]
    Hs256,
}

impl Algorithm {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::EdDsa => "EdDSA",
            Algorithm::Hs256 => "HS256",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Algorithm> for jsonwebtoken::Algorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::EdDsa => jsonwebtoken::Algorithm::EdDSA,
            Algorithm::Hs256 => jsonwebtoken::Algorithm::HS256,
        }
    }
}

impl TryFrom<jsonwebtoken::Algorithm> for Algorithm {
    type Error = Report<PensiunError>;

    fn try_from(algorithm: jsonwebtoken::Algorithm) -> Result<Self, Self::Error> {
        match algorithm {
            jsonwebtoken::Algorithm::EdDSA => Ok(Algorithm::EdDsa),
            jsonwebtoken::Algorithm::HS256 => Ok(Algorithm::Hs256),
            other => Err(Report::new(PensiunError::Verification {
                message: format!("Unsupported token algorithm {:?}", other),
            })),
        }
    }
}

impl FromStr for Algorithm {
    type Err = Report<PensiunError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eddsa" | "ed25519" => Ok(Algorithm::EdDsa),
            "hs256" | "hmac" => Ok(Algorithm::Hs256),
            other => Err(Report::new(PensiunError::KeyMaterial {
                message: format!("Unsupported algorithm '{}'", other),
            })),
        }
    }
}

/// Shared HMAC secret. The bytes never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct HmacSecret(Vec<u8>);

impl HmacSecret {
    /// Wraps secret bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is empty.
    pub fn new(bytes: Vec<u8>) -> Result<Self, Report<PensiunError>> {
        if bytes.is_empty() {
            return Err(Report::new(PensiunError::KeyMaterial {
                message: "HMAC secret is empty".into(),
            }));
        }
        if bytes.len() < RECOMMENDED_HMAC_SECRET_LENGTH {
            log::warn!(
                "HMAC secret is {} bytes, at least {} are recommended",
                bytes.len(),
                RECOMMENDED_HMAC_SECRET_LENGTH
            );
        }
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for HmacSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HmacSecret([REDACTED; {}])", self.0.len())
    }
}

fn decode_base64_key(text: &str) -> Result<Vec<u8>, Report<PensiunError>> {
    let text = text.trim();
    general_purpose::STANDARD
        .decode(text)
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(text))
        .map_err(|_| {
            Report::new(PensiunError::KeyMaterial {
                message: "Failed to decode base64 key".into(),
            })
        })
}

/// Parses an Ed25519 signing key from 32 raw bytes or their base64 text.
///
/// # Errors
///
/// Returns an error if the input is empty, not valid base64, or not 32 bytes.
pub fn parse_ed25519_signing_key(key_bytes: &[u8]) -> Result<SigningKey, Report<PensiunError>> {
    if key_bytes.is_empty() {
        return Err(Report::new(PensiunError::KeyMaterial {
            message: "Ed25519 signing key is empty".into(),
        }));
    }

    let bytes = if key_bytes.len() > ED25519_KEY_LENGTH {
        let text = std::str::from_utf8(key_bytes).change_context(PensiunError::KeyMaterial {
            message: "Ed25519 key is neither 32 raw bytes nor base64 text".into(),
        })?;
        decode_base64_key(text)?
    } else {
        key_bytes.to_vec()
    };

    let key_array: [u8; ED25519_KEY_LENGTH] = bytes.try_into().map_err(|_| {
        Report::new(PensiunError::KeyMaterial {
            message: "Invalid key length (expected 32 bytes for Ed25519)".into(),
        })
    })?;

    Ok(SigningKey::from_bytes(&key_array))
}

/// Private material used to produce signatures.
#[derive(Clone)]
pub enum SigningKeyMaterial {
    Ed25519(SigningKey),
    Hmac(HmacSecret),
}

impl SigningKeyMaterial {
    /// Builds key material from raw key bytes.
    ///
    /// Ed25519 accepts 32 raw bytes or base64 text. HS256 uses the bytes as the
    /// secret after trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or malformed for the algorithm.
    pub fn from_bytes(algorithm: Algorithm, bytes: &[u8]) -> Result<Self, Report<PensiunError>> {
        match algorithm {
            Algorithm::EdDsa => parse_ed25519_signing_key(bytes).map(Self::Ed25519),
            Algorithm::Hs256 => HmacSecret::new(bytes.trim_ascii().to_vec()).map(Self::Hmac),
        }
    }

    /// Builds key material from its base64 storage form.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not base64 or the decoded key is malformed.
    pub fn from_base64(algorithm: Algorithm, encoded: &str) -> Result<Self, Report<PensiunError>> {
        let bytes = decode_base64_key(encoded)?;
        match algorithm {
            Algorithm::EdDsa => parse_ed25519_signing_key(&bytes).map(Self::Ed25519),
            Algorithm::Hs256 => HmacSecret::new(bytes).map(Self::Hmac),
        }
    }

    /// Reads key material from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or holds a malformed key.
    pub fn from_key_file(algorithm: Algorithm, path: &Path) -> Result<Self, Report<PensiunError>> {
        let bytes = fs::read(path).change_context(PensiunError::KeyMaterial {
            message: format!("Failed to read key file {}", path.display()),
        })?;
        let bytes = match algorithm {
            // Key files are usually base64 text with a trailing newline.
            Algorithm::EdDsa if bytes.len() > ED25519_KEY_LENGTH => bytes.trim_ascii().to_vec(),
            _ => bytes,
        };
        Self::from_bytes(algorithm, &bytes)
            .attach(format!("while loading key file {}", path.display()))
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Ed25519(_) => Algorithm::EdDsa,
            Self::Hmac(_) => Algorithm::Hs256,
        }
    }

    /// Key handed to `jsonwebtoken::encode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Ed25519 key cannot be encoded as PKCS#8.
    pub fn encoding_key(&self) -> Result<EncodingKey, Report<PensiunError>> {
        match self {
            Self::Ed25519(key) => {
                let der = key.to_pkcs8_der().map_err(|e| {
                    Report::new(PensiunError::KeyMaterial {
                        message: format!("Failed to encode Ed25519 key: {}", e),
                    })
                })?;
                Ok(EncodingKey::from_ed_der(der.as_bytes()))
            }
            Self::Hmac(secret) => Ok(EncodingKey::from_secret(secret.as_bytes())),
        }
    }

    /// Key used to check signatures made by this key.
    #[must_use]
    pub fn verification_key(&self) -> VerificationKey {
        match self {
            Self::Ed25519(key) => VerificationKey::Ed25519(key.verifying_key()),
            Self::Hmac(secret) => VerificationKey::Hmac(secret.clone()),
        }
    }

    /// Base64 storage form of the private key or secret.
    #[must_use]
    pub fn to_base64(&self) -> String {
        match self {
            Self::Ed25519(key) => general_purpose::STANDARD.encode(key.as_bytes()),
            Self::Hmac(secret) => general_purpose::STANDARD.encode(secret.as_bytes()),
        }
    }
}

impl fmt::Debug for SigningKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ed25519(_) => f.write_str("SigningKeyMaterial::Ed25519([REDACTED])"),
            Self::Hmac(secret) => write!(f, "SigningKeyMaterial::Hmac({:?})", secret),
        }
    }
}

/// Material used to check signatures.
#[derive(Debug, Clone)]
pub enum VerificationKey {
    Ed25519(VerifyingKey),
    Hmac(HmacSecret),
}

impl VerificationKey {
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Ed25519(_) => Algorithm::EdDsa,
            Self::Hmac(_) => Algorithm::Hs256,
        }
    }

    /// Key handed to `jsonwebtoken::decode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Ed25519 public key is rejected.
    pub fn decoding_key(&self) -> Result<DecodingKey, Report<PensiunError>> {
        match self {
            Self::Ed25519(key) => {
                let x = general_purpose::URL_SAFE_NO_PAD.encode(key.as_bytes());
                DecodingKey::from_ed_components(&x).change_context(PensiunError::KeyMaterial {
                    message: "Invalid Ed25519 public key".into(),
                })
            }
            Self::Hmac(secret) => Ok(DecodingKey::from_secret(secret.as_bytes())),
        }
    }
}
