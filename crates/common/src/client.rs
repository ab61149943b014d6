//! Signed HTTP client for the pensiun APIs.
//!
//! Every request is signed with [`RequestSigner::sign_request`] and the token
//! is attached according to [`SignatureTransport`]. Requests without a body
//! (list, get, delete) always carry the token in a header.

use std::time::Duration;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use serde_json::{json, Value};

use crate::constants::{HEADER_PENSIUN_KEY_ID, HEADER_PENSIUN_REQUEST_ID};
use crate::error::PensiunError;
use crate::models::{Method, Payload, Resource};
use crate::request_signing::RequestSigner;
use crate::settings::{SignatureTransport, Settings};

/// An outbound request, fully signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Sends requests over the wire.
pub trait Transport {
    /// # Errors
    ///
    /// Returns an `Http` error if the request cannot be sent or the response read.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, Report<PensiunError>>;
}

/// Blocking transport backed by `ureq`.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, Report<PensiunError>> {
        let http_error = |e: ureq::Error| {
            Report::new(PensiunError::Http {
                message: format!("Failed to send request: {}", e),
            })
        };

        let body = request.body.as_deref().unwrap_or_default();
        let response = match request.method {
            Method::Get | Method::Delete => {
                let mut builder = if request.method == Method::Get {
                    self.agent.get(request.url.as_str())
                } else {
                    self.agent.delete(request.url.as_str())
                };
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call().map_err(http_error)?
            }
            Method::Post | Method::Put => {
                let mut builder = if request.method == Method::Post {
                    self.agent.post(request.url.as_str())
                } else {
                    self.agent.put(request.url.as_str())
                };
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.send(body).map_err(http_error)?
            }
        };

        let status = response.status().as_u16();
        let body = response
            .into_body()
            .read_to_string()
            .map_err(|e| {
                Report::new(PensiunError::Http {
                    message: format!("Failed to read response: {}", e),
                })
            })?;

        Ok(HttpResponse { status, body })
    }
}

/// Client that signs and sends API requests.
pub struct SignedRequestClient<T = UreqTransport> {
    settings: Settings,
    signer: RequestSigner,
    transport: T,
}

impl SignedRequestClient<UreqTransport> {
    /// Builds a client with the signer and timeout described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing key cannot be loaded.
    pub fn from_settings(settings: Settings) -> Result<Self, Report<PensiunError>> {
        let signer = RequestSigner::from_settings(&settings)?;
        let transport = UreqTransport::new(Duration::from_secs(settings.api.timeout_secs));
        Ok(Self::new(settings, signer, transport))
    }
}

impl<T: Transport> SignedRequestClient<T> {
    pub fn new(settings: Settings, signer: RequestSigner, transport: T) -> Self {
        Self {
            settings,
            signer,
            transport,
        }
    }

    #[must_use]
    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Builds and signs a request without sending it.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be built or signing fails.
    pub fn build_request(
        &self,
        method: Method,
        resource: Resource,
        id: Option<&str>,
        query: &[(String, String)],
        payload: Option<&Payload>,
        now: DateTime<Utc>,
    ) -> Result<HttpRequest, Report<PensiunError>> {
        let mut url = self.settings.resource_url(resource, id)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let path_and_query = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };

        let canonical_body = payload
            .map(Payload::to_canonical_json)
            .transpose()?
            .map(String::into_bytes);
        let signed_bytes = canonical_body.as_deref().unwrap_or_default();

        let parts = self
            .signer
            .sign_request(method, &path_and_query, signed_bytes, now)
            .change_context(PensiunError::Signing {
                message: format!("Failed to sign {} {}", method, path_and_query),
            })?;

        let mut headers = vec![
            ("Accept".to_string(), "application/json".to_string()),
            (HEADER_PENSIUN_KEY_ID.to_string(), self.signer.kid.clone()),
            (HEADER_PENSIUN_REQUEST_ID.to_string(), parts.claims.jti.clone()),
        ];

        let transport = match (self.settings.signing.transport, &canonical_body) {
            (SignatureTransport::Body, Some(_)) => SignatureTransport::Body,
            _ => SignatureTransport::Header,
        };

        let body = match (transport, payload) {
            (SignatureTransport::Body, Some(payload)) => {
                let envelope = json!({
                    "payload": payload,
                    "signature": parts.signature,
                });
                Some(envelope.to_string().into_bytes())
            }
            _ => {
                headers.push((
                    self.settings.signing.header_name.clone(),
                    parts.signature.into_string(),
                ));
                canonical_body
            }
        };

        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        Ok(HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        })
    }

    /// Sends a signed request and returns the decoded JSON response.
    ///
    /// # Errors
    ///
    /// Returns an `Api` error for non-success statuses and an `Http` error for
    /// transport failures.
    pub fn execute(&self, request: &HttpRequest) -> Result<Value, Report<PensiunError>> {
        log::info!("{} {}", request.method, request.url);
        let response = self.transport.send(request)?;
        log::info!("{} {} -> {}", request.method, request.url, response.status);

        if !(200..300).contains(&response.status) {
            return Err(Report::new(PensiunError::Api {
                status: response.status,
                message: response.body,
            }));
        }

        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response.body).change_context(PensiunError::Http {
            message: "Response body is not valid JSON".into(),
        })
    }

    fn call(
        &self,
        method: Method,
        resource: Resource,
        id: Option<&str>,
        query: &[(String, String)],
        payload: Option<&Payload>,
    ) -> Result<Value, Report<PensiunError>> {
        let request = self.build_request(method, resource, id, query, payload, Utc::now())?;
        self.execute(&request)
    }

    /// Submits a pension record for verification.
    ///
    /// # Errors
    ///
    /// Returns an error if signing, transport or the API call fails.
    pub fn pengecekan(&self, payload: &Payload) -> Result<Value, Report<PensiunError>> {
        self.call(Method::Post, Resource::Pengecekan, None, &[], Some(payload))
    }

    /// # Errors
    ///
    /// Returns an error if signing, transport or the API call fails.
    pub fn list(
        &self,
        resource: Resource,
        query: &[(String, String)],
    ) -> Result<Value, Report<PensiunError>> {
        self.call(Method::Get, resource, None, query, None)
    }

    /// # Errors
    ///
    /// Returns an error if signing, transport or the API call fails.
    pub fn get(&self, resource: Resource, id: &str) -> Result<Value, Report<PensiunError>> {
        self.call(Method::Get, resource, Some(id), &[], None)
    }

    /// # Errors
    ///
    /// Returns an error if signing, transport or the API call fails.
    pub fn create(
        &self,
        resource: Resource,
        payload: &Payload,
    ) -> Result<Value, Report<PensiunError>> {
        self.call(Method::Post, resource, None, &[], Some(payload))
    }

    /// # Errors
    ///
    /// Returns an error if signing, transport or the API call fails.
    pub fn update(
        &self,
        resource: Resource,
        id: &str,
        payload: &Payload,
    ) -> Result<Value, Report<PensiunError>> {
        self.call(Method::Put, resource, Some(id), &[], Some(payload))
    }

    /// # Errors
    ///
    /// Returns an error if signing, transport or the API call fails.
    pub fn delete(&self, resource: Resource, id: &str) -> Result<Value, Report<PensiunError>> {
        self.call(Method::Delete, resource, Some(id), &[], None)
    }
}
