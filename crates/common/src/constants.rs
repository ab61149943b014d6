//! Header names, store keys and protocol constants shared by client and verifier.

/// Default header carrying the compact JWS.
pub const HEADER_PENSIUN_SIGNATURE: &str = "X-Pensiun-Signature";

/// Header carrying the key id used for the signature.
pub const HEADER_PENSIUN_KEY_ID: &str = "X-Pensiun-Key-Id";

/// Header with a per-request id, mirrors the `jti` claim.
pub const HEADER_PENSIUN_REQUEST_ID: &str = "X-Pensiun-Request-Id";

/// Public store key naming the kid used for new signatures.
pub const CURRENT_KID_KEY: &str = "current-kid";

/// Public store key listing kids whose public keys are published.
pub const ACTIVE_KIDS_KEY: &str = "active-kids";

/// Public store key listing kids of HS256 shared secrets accepted by the verifier.
pub const ACTIVE_SECRETS_KEY: &str = "active-secrets";

/// Prefix for generated key ids (`pk-YYYY-MM-DD`).
pub const KID_PREFIX: &str = "pk";

/// Discovery document format version.
pub const DISCOVERY_VERSION: &str = "1.0";

/// Prefix used for body and settings digests.
pub const DIGEST_PREFIX: &str = "sha256:";
