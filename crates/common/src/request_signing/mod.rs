//! Request signing utilities for authenticated API calls.
//!
//! This module provides JWT (compact JWS) signing with Ed25519 or HMAC-SHA256
//! keys, including JWKS management, key rotation, and signature verification.

pub mod discovery;
pub mod jwks;
pub mod jwt;
pub mod keys;
pub mod rotation;
pub mod signing;
pub mod verify;

pub use discovery::*;
pub use jwks::*;
pub use jwt::*;
pub use keys::*;
pub use rotation::*;
pub use signing::*;
pub use verify::*;
