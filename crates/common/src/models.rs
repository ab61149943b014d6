//! Request payloads and the API resources they are sent to.

use std::fmt;
use std::str::FromStr;

use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::canonical::canonicalize;
use crate::error::PensiunError;

/// A request payload: field names mapped to JSON values.
///
/// Pension records carry agency specific fields, so the payload stays an open
/// map rather than a fixed struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, replacing any previous value.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Parses a payload from JSON text. The top level must be an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not JSON or not a JSON object.
    pub fn from_json_str(json: &str) -> Result<Self, Report<PensiunError>> {
        let value: Value =
            serde_json::from_str(json).change_context(PensiunError::InvalidRequest {
                message: "Payload is not valid JSON".into(),
            })?;
        Self::try_from(value)
    }

    /// Canonical JSON text of the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if canonical encoding fails.
    pub fn to_canonical_json(&self) -> Result<String, Report<PensiunError>> {
        canonicalize(&Value::Object(self.0.clone()))
    }
}

impl TryFrom<Value> for Payload {
    type Error = Report<PensiunError>;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Report::new(PensiunError::InvalidRequest {
                message: format!("Payload must be a JSON object, got {}", json_kind(&other)),
            })),
        }
    }
}

impl From<Payload> for Value {
    fn from(payload: Payload) -> Self {
        Value::Object(payload.0)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// API resources reachable through the signed client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    /// Pension record verification.
    Pengecekan,
    /// Pension record submissions.
    Pengajuan,
    /// Dashboard users.
    Users,
    /// Organizational units.
    Unit,
}

impl Resource {
    pub const ALL: [Resource; 4] = [
        Resource::Pengecekan,
        Resource::Pengajuan,
        Resource::Users,
        Resource::Unit,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Pengecekan => "pengecekan",
            Resource::Pengajuan => "pengajuan",
            Resource::Users => "users",
            Resource::Unit => "unit",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = Report<PensiunError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Report::new(PensiunError::InvalidRequest {
                    message: format!("Unknown resource '{}'", s),
                })
            })
    }
}

/// HTTP methods used by the signed client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Whether requests with this method carry a JSON body.
    #[must_use]
    pub fn has_body(self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Report<PensiunError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            other => Err(Report::new(PensiunError::InvalidRequest {
                message: format!("Unsupported HTTP method '{}'", other),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_builder_and_canonical_json() {
        let payload = Payload::new()
            .with("nomor_pensiun", "P-001234")
            .with("nik", "3273010101800001")
            .with("tahun", 2024);

        assert_eq!(payload.get("tahun"), Some(&json!(2024)));
        assert_eq!(
            payload.to_canonical_json().expect("should canonicalize"),
            r#"{"nik":"3273010101800001","nomor_pensiun":"P-001234","tahun":2024}"#
        );
    }

    #[test]
    fn test_payload_rejects_non_object() {
        let err = Payload::from_json_str("[1,2,3]").expect_err("array payload should fail");
        assert!(err.to_string().contains("array"));

        assert!(Payload::from_json_str("not json").is_err());
    }

    #[test]
    fn test_resource_parse_and_display() {
        assert_eq!(
            "Pengajuan".parse::<Resource>().expect("should parse"),
            Resource::Pengajuan
        );
        assert_eq!(Resource::Unit.to_string(), "unit");
        assert!("pegawai".parse::<Resource>().is_err());
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("post".parse::<Method>().expect("should parse"), Method::Post);
        assert!("PATCH".parse::<Method>().is_err());
        assert!(Method::Put.has_body());
        assert!(!Method::Delete.has_body());
    }
}
