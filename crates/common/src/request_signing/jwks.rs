//! JSON Web Key Set (JWKS) management.
//!
//! Ed25519 keypairs are generated here and their public halves published as
//! JWKs so API servers can verify request signatures.

use base64::{engine::general_purpose, Engine};
use ed25519_dalek::{SigningKey, VerifyingKey};
use error_stack::{Report, ResultExt};
use jose_jwk::{
    jose_jwa::{Algorithm, Signing},
    Jwk, Key, Okp, OkpCurves, Parameters,
};
use rand::rngs::OsRng;

use crate::constants::ACTIVE_KIDS_KEY;
use crate::error::PensiunError;
use crate::key_store::KeyStore;

pub struct Keypair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl Keypair {
    #[must_use]
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self::from_signing_key(SigningKey::generate(&mut csprng))
    }

    #[must_use]
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    #[must_use]
    pub fn get_jwk(&self, kid: String) -> Jwk {
        let okp = Okp {
            crv: OkpCurves::Ed25519,
            x: self.verifying_key.as_bytes().to_vec().into(),
            d: None, // public only
        };

        Jwk {
            key: Key::Okp(okp),
            prm: Parameters {
                kid: Some(kid),
                alg: Some(Algorithm::Signing(Signing::EdDsa)),
                ..Default::default()
            },
        }
    }
}

/// Extracts an Ed25519 verifying key from public JWK JSON.
///
/// # Errors
///
/// Returns an error if the JSON is not an Ed25519 OKP key with a valid `x`.
pub fn verifying_key_from_jwk(jwk_json: &str) -> Result<VerifyingKey, Report<PensiunError>> {
    let jwk: serde_json::Value =
        serde_json::from_str(jwk_json).change_context(PensiunError::KeyMaterial {
            message: "Failed to parse JWK".into(),
        })?;

    let kty = jwk.get("kty").and_then(|v| v.as_str());
    let crv = jwk.get("crv").and_then(|v| v.as_str());
    if kty != Some("OKP") || crv != Some("Ed25519") {
        return Err(Report::new(PensiunError::KeyMaterial {
            message: format!(
                "JWK is not an Ed25519 key (kty={:?}, crv={:?})",
                kty.unwrap_or("none"),
                crv.unwrap_or("none")
            ),
        }));
    }

    let x_b64 = jwk.get("x").and_then(|v| v.as_str()).ok_or_else(|| {
        Report::new(PensiunError::KeyMaterial {
            message: "JWK missing 'x' parameter".into(),
        })
    })?;

    let public_key_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(x_b64)
        .map_err(|e| {
            Report::new(PensiunError::KeyMaterial {
                message: format!("Failed to decode public key: {}", e),
            })
        })?;

    let verifying_key_bytes: [u8; 32] = public_key_bytes.try_into().map_err(|_| {
        Report::new(PensiunError::KeyMaterial {
            message: "Public key must be 32 bytes".into(),
        })
    })?;

    VerifyingKey::from_bytes(&verifying_key_bytes).map_err(|e| {
        Report::new(PensiunError::KeyMaterial {
            message: format!("Failed to create verifying key: {}", e),
        })
    })
}

/// Parses a comma separated kid list.
#[must_use]
pub fn parse_kid_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Retrieves the active public keys as a JWKS document.
///
/// # Errors
///
/// Returns an error if the active kid list or one of its JWKs is missing.
pub fn get_active_jwks<S: KeyStore>(store: &S) -> Result<String, Report<PensiunError>> {
    let active_kids_str = store
        .get_required(ACTIVE_KIDS_KEY)
        .attach("while fetching active kids list")?;

    let mut jwks = Vec::new();
    for kid in parse_kid_list(&active_kids_str) {
        let jwk = store
            .get_required(&kid)
            .attach(format!("Failed to get JWK for kid: {}", kid))?;
        jwks.push(jwk);
    }

    let keys_json = jwks.join(",");
    Ok(format!(r#"{{"keys":[{}]}}"#, keys_json))
}
