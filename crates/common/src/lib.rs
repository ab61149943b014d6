//! Common functionality for the pensiun dashboard API client.
//!
//! This crate signs requests to the pension verification (`pengecekan`),
//! submission (`pengajuan`), user and unit APIs with compact JWS tokens, and
//! provides the server-side verifier plus key management for those tokens.
//!
//! # Modules
//!
//! - [`canonical`]: Canonical JSON encoding and body digests
//! - [`client`]: Signed HTTP client for the APIs
//! - [`constants`]: Header names, store keys and protocol constants
//! - [`error`]: Error types and error handling utilities
//! - [`key_store`]: File and memory backed key stores
//! - [`logging`]: Logger setup
//! - [`models`]: Request payloads, resources and methods
//! - [`request_signing`]: JWS signing, verification, JWKS and key rotation
//! - [`settings`]: Configuration management and validation
//! - [`test_support`]: Testing utilities

pub mod canonical;
pub mod client;
pub mod constants;
pub mod error;
pub mod key_store;
pub mod logging;
pub mod models;
pub mod request_signing;
pub mod settings;
