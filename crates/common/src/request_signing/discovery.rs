//! Discovery document for API servers.
//!
//! Servers fetch this document to learn which public keys verify dashboard
//! request signatures and how the signature is transported.

use error_stack::{Report, ResultExt};
use serde::Serialize;

use crate::constants::{DISCOVERY_VERSION, HEADER_PENSIUN_KEY_ID};
use crate::error::PensiunError;
use crate::key_store::KeyStore;
use crate::settings::{SignatureTransport, Signing};

use super::jwks::get_active_jwks;

#[derive(Debug, Serialize)]
pub struct SignatureTransportInfo {
    pub transport: SignatureTransport,
    pub signature_header: String,
    pub key_id_header: String,
}

/// Document published next to the API for signature verification.
#[derive(Debug, Serialize)]
pub struct DiscoveryDocument {
    /// Version of the discovery document format
    pub version: String,

    pub issuer: String,

    /// JSON Web Key Set containing public keys for signature verification
    pub jwks: serde_json::Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureTransportInfo>,
}

impl DiscoveryDocument {
    #[must_use]
    pub fn new(issuer: impl Into<String>, jwks_value: serde_json::Value) -> Self {
        Self {
            version: DISCOVERY_VERSION.to_string(),
            issuer: issuer.into(),
            jwks: jwks_value,
            signature: None,
        }
    }

    /// Builds the document from the active keys in `store` and signing settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the JWKS cannot be retrieved or parsed.
    pub fn from_store<S: KeyStore>(
        store: &S,
        signing: &Signing,
    ) -> Result<Self, Report<PensiunError>> {
        let jwks_json = get_active_jwks(store).change_context(PensiunError::KeyStore {
            message: "Failed to retrieve JWKS".into(),
        })?;

        let jwks_value: serde_json::Value =
            serde_json::from_str(&jwks_json).change_context(PensiunError::KeyStore {
                message: "Failed to parse JWKS JSON".into(),
            })?;

        let mut document = Self::new(signing.issuer.clone(), jwks_value);
        document.signature = Some(SignatureTransportInfo {
            transport: signing.transport,
            signature_header: signing.header_name.clone(),
            key_id_header: HEADER_PENSIUN_KEY_ID.to_string(),
        });
        Ok(document)
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, Report<PensiunError>> {
        serde_json::to_string_pretty(self).change_context(PensiunError::KeyStore {
            message: "Failed to serialize discovery document".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ACTIVE_KIDS_KEY;
    use crate::key_store::MemoryKeyStore;
    use crate::test_support::tests::create_test_settings;
    use serde_json::json;

    #[test]
    fn test_discovery_document_structure() {
        let jwks = json!({
            "keys": [
                {
                    "kty": "OKP",
                    "crv": "Ed25519",
                    "x": "test_key",
                    "kid": "test-kid"
                }
            ]
        });

        let discovery = DiscoveryDocument::new("dashboard", jwks);

        assert_eq!(discovery.version, "1.0");
        assert!(discovery.jwks.is_object());
    }

    #[test]
    fn test_discovery_document_serialization() {
        let discovery = DiscoveryDocument::new("dashboard", json!({ "keys": [] }));
        let serialized = discovery.to_json_pretty().expect("should serialize");
        let parsed: serde_json::Value =
            serde_json::from_str(&serialized).expect("should parse serialized JSON");

        assert_eq!(parsed["version"], "1.0");
        assert_eq!(parsed["issuer"], "dashboard");
        assert!(parsed.get("signature").is_none());
    }

    #[test]
    fn test_discovery_from_store() {
        let store = MemoryKeyStore::new();
        store.put(ACTIVE_KIDS_KEY, "pk-1").expect("should put");
        store
            .put("pk-1", r#"{"kty":"OKP","crv":"Ed25519","x":"abc","kid":"pk-1"}"#)
            .expect("should put");
        let settings = create_test_settings();

        let discovery =
            DiscoveryDocument::from_store(&store, &settings.signing).expect("should build");
        let parsed: serde_json::Value =
            serde_json::from_str(&discovery.to_json_pretty().expect("should serialize"))
                .expect("should parse");

        assert_eq!(parsed["jwks"]["keys"][0]["kid"], "pk-1");
        assert_eq!(parsed["signature"]["transport"], "header");
        assert_eq!(parsed["signature"]["signature_header"], "X-Pensiun-Signature");
    }

    #[test]
    fn test_discovery_from_empty_store_fails() {
        let settings = create_test_settings();
        assert!(DiscoveryDocument::from_store(&MemoryKeyStore::new(), &settings.signing).is_err());
    }
}
