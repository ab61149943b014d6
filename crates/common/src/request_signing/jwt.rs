//! Compact JWS encoding on top of `jsonwebtoken`.
//!
//! Claims are rendered as canonical JSON before encoding, so the same claims
//! and key always produce the same token.

use std::fmt;

use error_stack::{Report, ResultExt};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::canonical::canonicalize_serializable;
use crate::error::PensiunError;

use super::keys::{Algorithm, SigningKeyMaterial, VerificationKey};

/// A signed compact JWS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Signature {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn verification_error(message: impl Into<String>) -> PensiunError {
    PensiunError::Verification {
        message: message.into(),
    }
}

/// Stateless helper producing and checking compact JWS tokens.
pub struct JwtHelper;

impl JwtHelper {
    /// Signs `claims` with `key`, naming `kid` in the header when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be canonicalized or encoding fails.
    pub fn sign<T: Serialize>(
        claims: &T,
        key: &SigningKeyMaterial,
        kid: Option<&str>,
    ) -> Result<Signature, Report<PensiunError>> {
        let mut header = Header::new(key.algorithm().into());
        header.kid = kid.map(str::to_string);

        let canonical = canonicalize_serializable(claims).change_context(PensiunError::Signing {
            message: "Failed to encode JWS claims".into(),
        })?;
        let claims = RawValue::from_string(canonical).change_context(PensiunError::Signing {
            message: "Failed to encode JWS claims".into(),
        })?;

        let token = encode(&header, &claims, &key.encoding_key()?).change_context(
            PensiunError::Signing {
                message: "Failed to compute signature".into(),
            },
        )?;
        Ok(Signature(token))
    }

    /// Reads the header of a token without checking its signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed or uses an unsupported algorithm.
    pub fn header(token: &str) -> Result<(Header, Algorithm), Report<PensiunError>> {
        let header = decode_header(token.trim())
            .change_context(verification_error("Malformed token header"))?;
        let algorithm = Algorithm::try_from(header.alg)?;
        Ok((header, algorithm))
    }

    /// Validation for tokens signed by `key`.
    ///
    /// No claim is required and no time check is enabled; callers opt in.
    #[must_use]
    pub fn validation(key: &VerificationKey, leeway_secs: u64) -> Validation {
        let mut validation = Validation::new(key.algorithm().into());
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = leeway_secs;
        validation
    }

    /// Checks `token` with `key` and returns its header and claims.
    ///
    /// Returns `Ok(None)` when the token is well formed but its signature does
    /// not match the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, its algorithm does not match
    /// the key type, or a time or claim check in `validation` fails.
    pub fn decode(
        token: &str,
        key: &VerificationKey,
        validation: &Validation,
    ) -> Result<Option<TokenData<Value>>, Report<PensiunError>> {
        match decode::<Value>(token.trim(), &key.decoding_key()?, validation) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                let message = match e.kind() {
                    ErrorKind::InvalidSignature => return Ok(None),
                    ErrorKind::InvalidAlgorithm => format!(
                        "Token algorithm does not match key algorithm {}",
                        key.algorithm()
                    ),
                    ErrorKind::ExpiredSignature => "Token expired".to_string(),
                    ErrorKind::ImmatureSignature => "Token issued in the future".to_string(),
                    ErrorKind::MissingRequiredClaim(claim) => {
                        format!("Token is missing the {} claim", claim)
                    }
                    _ => "Malformed token".to_string(),
                };
                Err(Report::new(e).change_context(verification_error(message)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose, Engine};
    use serde_json::json;

    fn hmac_key() -> SigningKeyMaterial {
        SigningKeyMaterial::from_bytes(Algorithm::Hs256, b"jwt-helper-test-secret-32-bytes!")
            .expect("should build key")
    }

    fn ed_key() -> SigningKeyMaterial {
        SigningKeyMaterial::from_bytes(Algorithm::EdDsa, &[3u8; 32]).expect("should build key")
    }

    fn check(token: &Signature, key: &SigningKeyMaterial) -> Option<TokenData<Value>> {
        let verification = key.verification_key();
        let validation = JwtHelper::validation(&verification, 0);
        JwtHelper::decode(token.as_str(), &verification, &validation).expect("should decode")
    }

    #[test]
    fn test_sign_produces_three_parts() {
        let token =
            JwtHelper::sign(&json!({"nik": "1"}), &hmac_key(), Some("k1")).expect("should sign");
        assert_eq!(token.as_str().split('.').count(), 3);
        assert!(!token.as_str().contains('='));
    }

    #[test]
    fn test_sign_is_deterministic_for_both_algorithms() {
        for key in [hmac_key(), ed_key()] {
            let a = JwtHelper::sign(&json!({"b": 2, "a": 1}), &key, Some("k1"))
                .expect("should sign");
            let b = JwtHelper::sign(&json!({"a": 1, "b": 2}), &key, Some("k1"))
                .expect("should sign");
            assert_eq!(a, b, "{} tokens should be deterministic", key.algorithm());
        }
    }

    #[test]
    fn test_header_and_claims_roundtrip() {
        for key in [hmac_key(), ed_key()] {
            let token = JwtHelper::sign(&json!({"b": 2, "a": 1}), &key, Some("k1"))
                .expect("should sign");

            let (header, algorithm) = JwtHelper::header(token.as_str()).expect("should read");
            assert_eq!(algorithm, key.algorithm());
            assert_eq!(header.kid.as_deref(), Some("k1"));
            assert_eq!(header.typ.as_deref(), Some("JWT"));

            let data = check(&token, &key).expect("signature should match");
            assert_eq!(data.claims, json!({"a": 1, "b": 2}));
        }
    }

    #[test]
    fn test_header_rejects_malformed_tokens() {
        for token in ["", "abc", "a.b", "!!.??.**"] {
            assert!(JwtHelper::header(token).is_err(), "{token} should be rejected");
        }
    }

    #[test]
    fn test_decode_rejects_algorithm_mismatch() {
        let token = JwtHelper::sign(&json!({"x": 1}), &hmac_key(), None).expect("should sign");
        let ed = ed_key().verification_key();
        let validation = JwtHelper::validation(&ed, 0);

        let err = JwtHelper::decode(token.as_str(), &ed, &validation)
            .expect_err("HS256 token should not check against an Ed25519 key");
        assert!(format!("{err:?}").contains("does not match"));
    }

    #[test]
    fn test_tampered_claims_do_not_verify() {
        for key in [hmac_key(), ed_key()] {
            let token = JwtHelper::sign(&json!({"amount": 100}), &key, None).expect("should sign");
            let forged_claims = general_purpose::URL_SAFE_NO_PAD.encode(r#"{"amount":900}"#);

            let parts: Vec<&str> = token.as_str().split('.').collect();
            let forged = Signature(format!("{}.{}.{}", parts[0], forged_claims, parts[2]));

            assert!(check(&forged, &key).is_none());
        }
    }

    #[test]
    fn test_time_checks_use_leeway() {
        let key = hmac_key();
        let verification = key.verification_key();
        let now = chrono::Utc::now().timestamp();
        let token = JwtHelper::sign(&json!({"exp": now - 30}), &key, None).expect("should sign");

        let mut strict = JwtHelper::validation(&verification, 0);
        strict.validate_exp = true;
        let err = JwtHelper::decode(token.as_str(), &verification, &strict)
            .expect_err("expired token should fail");
        assert!(format!("{err:?}").contains("expired"));

        let mut lenient = JwtHelper::validation(&verification, 60);
        lenient.validate_exp = true;
        assert!(JwtHelper::decode(token.as_str(), &verification, &lenient)
            .expect("should decode within leeway")
            .is_some());
    }
}
