//! Key rotation management for request signing.
//!
//! This module provides functionality for rotating signing keys, managing key
//! lifecycle, and storing keys in the public and secret key stores.

use ed25519_dalek::SigningKey;
use error_stack::{Report, ResultExt};
use jose_jwk::Jwk;

use crate::constants::{ACTIVE_KIDS_KEY, ACTIVE_SECRETS_KEY, CURRENT_KID_KEY, KID_PREFIX};
use crate::error::PensiunError;
use crate::key_store::KeyStore;

use super::jwks::parse_kid_list;
use super::keys::{Algorithm, SigningKeyMaterial};
use super::Keypair;

#[derive(Debug, Clone)]
pub struct KeyRotationResult {
    pub new_kid: String,
    pub previous_kid: Option<String>,
    pub active_kids: Vec<String>,
    /// Kids that were active before the rotation and no longer are.
    pub retired_kids: Vec<String>,
    pub jwk: Jwk,
}

pub struct KeyRotationManager<P, S> {
    public: P,
    secret: S,
}

impl<P: KeyStore, S: KeyStore> KeyRotationManager<P, S> {
    pub fn new(public: P, secret: S) -> Self {
        Self { public, secret }
    }

    /// Generates a new Ed25519 key and makes it current.
    ///
    /// The previous current key stays active so requests signed just before
    /// the rotation still verify. Any older active key is retired.
    ///
    /// # Errors
    ///
    /// Returns an error if the kid already exists or the stores cannot be written.
    pub fn rotate_key(
        &self,
        kid: Option<String>,
    ) -> Result<KeyRotationResult, Report<PensiunError>> {
        let new_kid = kid.unwrap_or_else(generate_date_based_kid);

        if self.public.get(&new_kid)?.is_some() || self.secret.get(&new_kid)?.is_some() {
            return Err(Report::new(PensiunError::KeyStore {
                message: format!("Key '{}' already exists, pass an explicit kid", new_kid),
            }));
        }

        let keypair = Keypair::generate();
        let jwk = keypair.get_jwk(new_kid.clone());
        let previous_kid = self.public.get(CURRENT_KID_KEY)?;
        let previously_active = self.list_active_keys()?;

        self.store_private_key(&new_kid, &keypair.signing_key)?;
        self.store_public_jwk(&new_kid, &jwk)?;

        let active_kids = match &previous_kid {
            Some(prev) if prev != &new_kid => vec![prev.clone(), new_kid.clone()],
            _ => vec![new_kid.clone()],
        };

        let retired_kids: Vec<String> = previously_active
            .into_iter()
            .filter(|k| !active_kids.contains(k))
            .collect();

        self.update_current_kid(&new_kid)?;
        self.update_active_kids(&active_kids)?;

        log::info!(
            "Rotated signing key: {} -> {}",
            previous_kid.as_deref().unwrap_or("(none)"),
            new_kid
        );
        if !retired_kids.is_empty() {
            log::info!("Retired signing keys: {}", retired_kids.join(","));
        }

        Ok(KeyRotationResult {
            new_kid,
            previous_kid,
            active_kids,
            retired_kids,
            jwk,
        })
    }

    /// Stores an HS256 shared secret under `kid` and marks it active.
    ///
    /// Shared secrets are never published in the JWKS. Their kids are listed
    /// under `active-secrets` so the verifier can stop accepting them.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is empty, `kid` names an Ed25519 key, or
    /// the stores cannot be written.
    pub fn store_shared_secret(
        &self,
        kid: &str,
        secret: &[u8],
    ) -> Result<(), Report<PensiunError>> {
        let key = SigningKeyMaterial::from_bytes(Algorithm::Hs256, secret)?;
        if self.public.get(kid)?.is_some() {
            return Err(Report::new(PensiunError::KeyStore {
                message: format!("Key '{}' is an Ed25519 key", kid),
            }));
        }

        self.secret
            .put(kid, &key.to_base64())
            .change_context(PensiunError::KeyStore {
                message: format!("Failed to store shared secret '{}'", kid),
            })?;

        let mut active = self.list_active_secrets()?;
        if !active.iter().any(|k| k == kid) {
            active.push(kid.to_string());
            self.update_active_secrets(&active)?;
        }
        Ok(())
    }

    fn store_private_key(
        &self,
        kid: &str,
        signing_key: &SigningKey,
    ) -> Result<(), Report<PensiunError>> {
        let key_b64 = SigningKeyMaterial::Ed25519(signing_key.clone()).to_base64();

        self.secret
            .put(kid, &key_b64)
            .change_context(PensiunError::KeyStore {
                message: format!("Failed to store private key '{}'", kid),
            })
    }

    fn store_public_jwk(&self, kid: &str, jwk: &Jwk) -> Result<(), Report<PensiunError>> {
        let jwk_json = serde_json::to_string(jwk).change_context(PensiunError::KeyStore {
            message: "Failed to serialize JWK".into(),
        })?;

        self.public
            .put(kid, &jwk_json)
            .change_context(PensiunError::KeyStore {
                message: format!("Failed to store public JWK '{}'", kid),
            })
    }

    fn update_current_kid(&self, kid: &str) -> Result<(), Report<PensiunError>> {
        self.public
            .put(CURRENT_KID_KEY, kid)
            .change_context(PensiunError::KeyStore {
                message: "Failed to update current-kid".into(),
            })
    }

    fn update_active_kids(&self, active_kids: &[String]) -> Result<(), Report<PensiunError>> {
        self.public
            .put(ACTIVE_KIDS_KEY, &active_kids.join(","))
            .change_context(PensiunError::KeyStore {
                message: "Failed to update active-kids".into(),
            })
    }

    fn update_active_secrets(&self, kids: &[String]) -> Result<(), Report<PensiunError>> {
        self.public
            .put(ACTIVE_SECRETS_KEY, &kids.join(","))
            .change_context(PensiunError::KeyStore {
                message: "Failed to update active-secrets".into(),
            })
    }

    /// Active Ed25519 kids, empty before the first rotation.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn list_active_keys(&self) -> Result<Vec<String>, Report<PensiunError>> {
        let active = self.public.get(ACTIVE_KIDS_KEY)?.unwrap_or_default();
        Ok(parse_kid_list(&active))
    }

    /// Active HS256 shared secret kids.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn list_active_secrets(&self) -> Result<Vec<String>, Report<PensiunError>> {
        let active = self.public.get(ACTIVE_SECRETS_KEY)?.unwrap_or_default();
        Ok(parse_kid_list(&active))
    }

    /// Current signing kid, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn current_kid(&self) -> Result<Option<String>, Report<PensiunError>> {
        self.public.get(CURRENT_KID_KEY)
    }

    /// Stops accepting a key.
    ///
    /// Ed25519 keys leave the published set. HS256 shared secrets leave
    /// `active-secrets`, after which the verifier rejects their tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if `kid` is not active, or is the current or last
    /// active Ed25519 key.
    pub fn deactivate_key(&self, kid: &str) -> Result<(), Report<PensiunError>> {
        let mut active_secrets = self.list_active_secrets()?;
        if active_secrets.iter().any(|k| k == kid) {
            active_secrets.retain(|k| k != kid);
            self.update_active_secrets(&active_secrets)?;
            log::info!("Deactivated shared secret {}", kid);
            return Ok(());
        }

        let mut active_kids = self.list_active_keys()?;
        if !active_kids.iter().any(|k| k == kid) {
            return Err(Report::new(PensiunError::KeyStore {
                message: format!("Key '{}' is not active", kid),
            }));
        }

        if self.current_kid()?.as_deref() == Some(kid) {
            return Err(Report::new(PensiunError::KeyStore {
                message: format!("Cannot deactivate current key '{}', rotate first", kid),
            }));
        }

        active_kids.retain(|k| k != kid);

        if active_kids.is_empty() {
            return Err(Report::new(PensiunError::KeyStore {
                message: "Cannot deactivate the last active key".into(),
            }));
        }

        self.update_active_kids(&active_kids)?;
        log::info!("Deactivated signing key {}", kid);
        Ok(())
    }

    /// Deactivates a key if needed and removes its JWK and private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, cannot be deactivated, or
    /// removal fails.
    pub fn delete_key(&self, kid: &str) -> Result<(), Report<PensiunError>> {
        let is_active = self.list_active_keys()?.iter().any(|k| k == kid)
            || self.list_active_secrets()?.iter().any(|k| k == kid);
        if is_active {
            self.deactivate_key(kid)?;
        } else if self.public.get(kid)?.is_none() && self.secret.get(kid)?.is_none() {
            return Err(Report::new(PensiunError::KeyStore {
                message: format!("Unknown key '{}'", kid),
            }));
        }

        self.public
            .delete(kid)
            .change_context(PensiunError::KeyStore {
                message: "Failed to delete JWK from public store".into(),
            })?;

        self.secret
            .delete(kid)
            .change_context(PensiunError::KeyStore {
                message: "Failed to delete secret from secret store".into(),
            })?;

        log::info!("Deleted key {}", kid);
        Ok(())
    }
}

#[must_use]
pub fn generate_date_based_kid() -> String {
    use chrono::Utc;
    format!("{}-{}", KID_PREFIX, Utc::now().format("%Y-%m-%d"))
}
