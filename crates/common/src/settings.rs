//! Configuration for the signed request client.
//!
//! Settings are read from a TOML document and merged with environment
//! variables prefixed with `PENSIUN__`. For example `PENSIUN__API__BASE_URL`
//! overrides `api.base_url`.

use std::fs;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::constants::HEADER_PENSIUN_SIGNATURE;
use crate::error::PensiunError;
use crate::models::Resource;
use crate::request_signing::Algorithm;

pub const ENVIRONMENT_VARIABLE_PREFIX: &str = "PENSIUN";
pub const ENVIRONMENT_VARIABLE_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Settings {
    #[validate(nested)]
    pub api: Api,
    #[validate(nested)]
    pub signing: Signing,
    #[serde(default)]
    #[validate(nested)]
    pub logging: Logging,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Api {
    #[validate(url)]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_secs: u64,
    #[serde(default)]
    #[validate(nested)]
    pub paths: ApiPaths,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ApiPaths {
    #[validate(length(min = 1))]
    pub pengecekan: String,
    #[validate(length(min = 1))]
    pub pengajuan: String,
    #[validate(length(min = 1))]
    pub users: String,
    #[validate(length(min = 1))]
    pub unit: String,
}

impl Default for ApiPaths {
    fn default() -> Self {
        Self {
            pengecekan: "/api/pengecekan".to_string(),
            pengajuan: "/api/pengajuan".to_string(),
            users: "/api/users".to_string(),
            unit: "/api/unit".to_string(),
        }
    }
}

impl ApiPaths {
    #[must_use]
    pub fn for_resource(&self, resource: Resource) -> &str {
        match resource {
            Resource::Pengecekan => &self.pengecekan,
            Resource::Pengajuan => &self.pengajuan,
            Resource::Users => &self.users,
            Resource::Unit => &self.unit,
        }
    }
}

/// Where the signature travels on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureTransport {
    /// Token in a request header, body is the canonical payload.
    #[default]
    Header,
    /// Body is `{"payload": ..., "signature": "..."}`.
    Body,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Signing {
    #[serde(default)]
    pub algorithm: Algorithm,
    /// Key id placed in the JWS header. Falls back to the key store's current kid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub kid: Option<String>,
    /// File holding the Ed25519 private key or HMAC secret (raw or base64).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    /// Inline HMAC secret. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    /// Directory of a file backed key store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_store_dir: Option<PathBuf>,
    #[validate(length(min = 1))]
    pub issuer: String,
    #[serde(default)]
    pub transport: SignatureTransport,
    #[serde(default = "default_header_name")]
    #[validate(length(min = 1))]
    pub header_name: String,
    #[serde(default = "default_token_ttl_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub token_ttl_secs: u64,
    #[serde(default = "default_max_clock_skew_secs")]
    #[validate(range(max = 600))]
    pub max_clock_skew_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Logging {
    #[serde(default = "default_log_level")]
    #[validate(length(min = 1))]
    pub level: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Logging {
    /// Parsed log level, `Info` when the configured name is unknown.
    #[must_use]
    pub fn level_filter(&self) -> LevelFilter {
        self.level.parse().unwrap_or(LevelFilter::Info)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_header_name() -> String {
    HEADER_PENSIUN_SIGNATURE.to_string()
}

fn default_token_ttl_secs() -> u64 {
    300
}

fn default_max_clock_skew_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Parses settings from TOML and merges `PENSIUN__` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or required fields are missing.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<PensiunError>> {
        let environment = Environment::default()
            .prefix(ENVIRONMENT_VARIABLE_PREFIX)
            .separator(ENVIRONMENT_VARIABLE_SEPARATOR);

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .change_context(PensiunError::Configuration {
                message: "Failed to build configuration".into(),
            })?;

        config
            .try_deserialize()
            .change_context(PensiunError::Configuration {
                message: "Failed to deserialize configuration".into(),
            })
    }

    /// Reads, merges and validates settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, Report<PensiunError>> {
        let content = fs::read_to_string(path).change_context(PensiunError::Configuration {
            message: format!("Failed to read settings file {}", path.display()),
        })?;

        let settings = Self::from_toml(&content)?;
        settings.validate_all()?;
        Ok(settings)
    }

    /// Runs field validation plus the checks that span several fields.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first failed rule.
    pub fn validate_all(&self) -> Result<(), Report<PensiunError>> {
        self.validate()
            .change_context(PensiunError::Configuration {
                message: "Settings validation failed".into(),
            })?;

        if self.signing.key_file.is_some() && self.signing.secret.is_some() {
            return Err(Report::new(PensiunError::Configuration {
                message: "signing.key_file and signing.secret are mutually exclusive".into(),
            }));
        }

        if self.signing.algorithm == Algorithm::EdDsa && self.signing.secret.is_some() {
            return Err(Report::new(PensiunError::Configuration {
                message: "signing.secret is only valid for HS256".into(),
            }));
        }

        Ok(())
    }

    /// Serializes the merged settings back to TOML. Secrets are omitted.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_canonical_toml(&self) -> Result<String, Report<PensiunError>> {
        toml::to_string(self).change_context(PensiunError::Configuration {
            message: "Failed to serialize settings".into(),
        })
    }

    /// Absolute URL for a resource path plus an optional trailing segment.
    ///
    /// The resource path is appended to any path already in `api.base_url`,
    /// so a gateway prefix such as `/pensiun/v1/` is kept. The id becomes one
    /// percent-encoded segment.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidRequest` error for an empty, `.` or `..` id and a
    /// `Configuration` error if the base URL cannot carry a path.
    pub fn resource_url(
        &self,
        resource: Resource,
        id: Option<&str>,
    ) -> Result<url::Url, Report<PensiunError>> {
        let encoded_id = match id {
            Some(bad @ ("" | "." | "..")) => {
                return Err(Report::new(PensiunError::InvalidRequest {
                    message: format!("Invalid {} id {:?}", resource, bad),
                }));
            }
            Some(id) => Some(urlencoding::encode(id)),
            None => None,
        };

        let mut url = url::Url::parse(&self.api.base_url).change_context(
            PensiunError::Configuration {
                message: format!("Invalid api.base_url '{}'", self.api.base_url),
            },
        )?;

        let path = self.api.paths.for_resource(resource);
        url.path_segments_mut()
            .map_err(|()| {
                Report::new(PensiunError::Configuration {
                    message: format!("api.base_url '{}' cannot carry a path", self.api.base_url),
                })
            })?
            .pop_if_empty()
            .extend(path.split('/').filter(|segment| !segment.is_empty()))
            .extend(encoded_id.as_deref());

        Ok(url)
    }
}
