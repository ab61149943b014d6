//! Signature verification, the API server's side of request signing.
//!
//! Keys are located through a [`KeyResolver`] by the `kid` in the token header.
//! The header algorithm must match the resolved key type, so an HS256 token can
//! never be checked against a published Ed25519 key or the other way round.

use chrono::Duration;
use error_stack::{Report, ResultExt};
use jsonwebtoken::Header;
use serde::Deserialize;
use serde_json::Value;

use crate::canonical::{canonicalize, compute_body_digest};
use crate::constants::{ACTIVE_KIDS_KEY, ACTIVE_SECRETS_KEY};
use crate::error::PensiunError;
use crate::key_store::KeyStore;
use crate::models::{Method, Payload};

use super::jwks::{parse_kid_list, verifying_key_from_jwk};
use super::jwt::JwtHelper;
use super::keys::{Algorithm, SigningKeyMaterial, VerificationKey};
use super::signing::RequestClaims;

/// Finds the verification key for a kid.
pub trait KeyResolver {
    /// # Errors
    ///
    /// Returns an error if the kid is unknown or its key is unusable.
    fn resolve(&self, kid: &str, alg: Algorithm) -> Result<VerificationKey, Report<PensiunError>>;
}

/// Resolves exactly one known key.
#[derive(Debug, Clone)]
pub struct SingleKeyResolver {
    kid: String,
    key: VerificationKey,
}

impl SingleKeyResolver {
    pub fn new(kid: impl Into<String>, key: VerificationKey) -> Self {
        Self {
            kid: kid.into(),
            key,
        }
    }
}

impl KeyResolver for SingleKeyResolver {
    fn resolve(&self, kid: &str, _alg: Algorithm) -> Result<VerificationKey, Report<PensiunError>> {
        if kid == self.kid {
            Ok(self.key.clone())
        } else {
            Err(Report::new(PensiunError::Verification {
                message: format!("Unknown kid: {}", kid),
            }))
        }
    }
}

/// Resolves EdDSA keys from published JWKs and HS256 secrets from a secret store.
///
/// HS256 kids must be listed under `active-secrets` in the public store.
pub struct StoreKeyResolver<P, S> {
    public: P,
    secret: Option<S>,
}

impl<P: KeyStore, S: KeyStore> StoreKeyResolver<P, S> {
    pub fn new(public: P, secret: Option<S>) -> Self {
        Self { public, secret }
    }

    fn not_active(kid: &str) -> Report<PensiunError> {
        Report::new(PensiunError::Verification {
            message: format!("Key '{}' is not active", kid),
        })
    }
}

impl<P: KeyStore, S: KeyStore> KeyResolver for StoreKeyResolver<P, S> {
    fn resolve(&self, kid: &str, alg: Algorithm) -> Result<VerificationKey, Report<PensiunError>> {
        match alg {
            Algorithm::EdDsa => {
                if let Some(active) = self.public.get(ACTIVE_KIDS_KEY)? {
                    if !parse_kid_list(&active).iter().any(|k| k == kid) {
                        return Err(Self::not_active(kid));
                    }
                }

                let jwk_json = self.public.get(kid)?.ok_or_else(|| {
                    Report::new(PensiunError::Verification {
                        message: format!("Unknown kid: {}", kid),
                    })
                })?;
                let key = verifying_key_from_jwk(&jwk_json)
                    .attach(format!("while loading JWK for kid: {}", kid))?;
                Ok(VerificationKey::Ed25519(key))
            }
            Algorithm::Hs256 => {
                let active = self.public.get(ACTIVE_SECRETS_KEY)?.unwrap_or_default();
                if !parse_kid_list(&active).iter().any(|k| k == kid) {
                    return Err(Self::not_active(kid));
                }

                let store = self.secret.as_ref().ok_or_else(|| {
                    Report::new(PensiunError::Verification {
                        message: "HS256 verification needs a secret store".into(),
                    })
                })?;
                let encoded = store.get(kid)?.ok_or_else(|| {
                    Report::new(PensiunError::Verification {
                        message: format!("Unknown kid: {}", kid),
                    })
                })?;
                let key = SigningKeyMaterial::from_base64(Algorithm::Hs256, &encoded)?;
                Ok(key.verification_key())
            }
        }
    }
}

/// A token whose signature has been checked.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub header: Header,
    pub claims: Value,
}

#[derive(Deserialize)]
struct BodyEnvelope {
    payload: Value,
    signature: String,
}

pub struct SignatureVerifier<R> {
    resolver: R,
    leeway_secs: u64,
}

impl<R: KeyResolver> SignatureVerifier<R> {
    /// Negative skew is treated as zero.
    pub fn new(resolver: R, max_clock_skew: Duration) -> Self {
        Self {
            resolver,
            leeway_secs: u64::try_from(max_clock_skew.num_seconds()).unwrap_or(0),
        }
    }

    /// Resolves the key named by the header and checks the token with it.
    ///
    /// With `time_bound`, `exp` and `nbf` are required and checked against the
    /// system clock with the skew allowance.
    fn decode_and_check(
        &self,
        token: &str,
        time_bound: bool,
    ) -> Result<Option<VerifiedToken>, Report<PensiunError>> {
        let (header, algorithm) = JwtHelper::header(token)?;
        let kid = header.kid.as_deref().ok_or_else(|| {
            Report::new(PensiunError::Verification {
                message: "Token header has no kid".into(),
            })
        })?;
        let key = self.resolver.resolve(kid, algorithm)?;

        let mut validation = JwtHelper::validation(&key, self.leeway_secs);
        if time_bound {
            validation.set_required_spec_claims(&["exp", "nbf"]);
            validation.validate_exp = true;
            validation.validate_nbf = true;
        }

        Ok(JwtHelper::decode(token, &key, &validation)?.map(|data| VerifiedToken {
            header: data.header,
            claims: data.claims,
        }))
    }

    /// Checks a token's signature and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, the kid is unknown, the
    /// algorithm does not match the key, or the signature is wrong.
    pub fn verify_token(&self, token: &str) -> Result<VerifiedToken, Report<PensiunError>> {
        self.decode_and_check(token, false)?.ok_or_else(|| {
            Report::new(PensiunError::Verification {
                message: "Signature verification failed".into(),
            })
        })
    }

    /// Checks that `token` is a valid signature over `payload`.
    ///
    /// Returns `Ok(false)` when the signature is well formed but does not match
    /// the key or the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed or its key cannot be resolved.
    pub fn verify_payload(
        &self,
        payload: &Payload,
        token: &str,
    ) -> Result<bool, Report<PensiunError>> {
        let Some(verified) = self.decode_and_check(token, false)? else {
            return Ok(false);
        };
        Ok(canonicalize(&verified.claims)? == payload.to_canonical_json()?)
    }

    /// Checks a signed HTTP request.
    ///
    /// Verifies the signature and the `exp`/`nbf` window (widened by the clock
    /// skew allowance), then that method, path and body digest match the claims.
    ///
    /// # Errors
    ///
    /// Returns a `Verification` error naming the first check that failed.
    pub fn verify_request(
        &self,
        method: Method,
        path_and_query: &str,
        body: &[u8],
        token: &str,
    ) -> Result<RequestClaims, Report<PensiunError>> {
        let verified = self.decode_and_check(token, true)?.ok_or_else(|| {
            Report::new(PensiunError::Verification {
                message: "Signature verification failed".into(),
            })
        })?;
        let claims: RequestClaims = serde_json::from_value(verified.claims).change_context(
            PensiunError::Verification {
                message: "Token claims are not request claims".into(),
            },
        )?;

        let fail = |message: String| -> Result<RequestClaims, Report<PensiunError>> {
            Err(Report::new(PensiunError::Verification { message }))
        };

        if claims.htm != method.as_str() {
            return fail(format!("Method mismatch: signed {}, got {}", claims.htm, method));
        }
        if claims.htu != path_and_query {
            return fail(format!(
                "Path mismatch: signed {}, got {}",
                claims.htu, path_and_query
            ));
        }
        if claims.bdh != compute_body_digest(body) {
            return fail("Body digest mismatch".to_string());
        }

        log::debug!("Verified {} {} (jti {})", claims.htm, claims.htu, claims.jti);
        Ok(claims)
    }

    /// Checks a request sent with the body transport.
    ///
    /// The body must be `{"payload": ..., "signature": "..."}`. The signed body
    /// digest covers the canonical payload JSON. Returns the claims and payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope is malformed or verification fails.
    pub fn verify_body_envelope(
        &self,
        method: Method,
        path_and_query: &str,
        body: &[u8],
    ) -> Result<(RequestClaims, Payload), Report<PensiunError>> {
        let envelope: BodyEnvelope =
            serde_json::from_slice(body).change_context(PensiunError::Verification {
                message: "Body is not a signature envelope".into(),
            })?;
        let payload = Payload::try_from(envelope.payload)?;
        let canonical = payload.to_canonical_json()?;

        let claims = self.verify_request(
            method,
            path_and_query,
            canonical.as_bytes(),
            &envelope.signature,
        )?;
        Ok((claims, payload))
    }
}
