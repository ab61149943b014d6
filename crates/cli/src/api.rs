//! Signed calls against the pensiun APIs.

use std::path::Path;

use chrono::Utc;
use pensiun_common::client::{HttpRequest, SignedRequestClient, Transport};
use pensiun_common::models::{Method, Payload, Resource};
use pensiun_common::settings::Settings;
use serde_json::Value;

use crate::error::CliError;
use crate::sign::read_payload;

/// One call against a resource collection.
#[derive(Debug, Clone)]
pub enum ResourceCall {
    List { query: Vec<(String, String)> },
    Get { id: String },
    Create { payload: Payload },
    Update { id: String, payload: Payload },
    Delete { id: String },
}

impl ResourceCall {
    fn method(&self) -> Method {
        match self {
            ResourceCall::List { .. } | ResourceCall::Get { .. } => Method::Get,
            ResourceCall::Create { .. } => Method::Post,
            ResourceCall::Update { .. } => Method::Put,
            ResourceCall::Delete { .. } => Method::Delete,
        }
    }

    fn id(&self) -> Option<&str> {
        match self {
            ResourceCall::Get { id }
            | ResourceCall::Update { id, .. }
            | ResourceCall::Delete { id } => Some(id),
            ResourceCall::List { .. } | ResourceCall::Create { .. } => None,
        }
    }

    fn query(&self) -> &[(String, String)] {
        match self {
            ResourceCall::List { query } => query,
            _ => &[],
        }
    }

    fn payload(&self) -> Option<&Payload> {
        match self {
            ResourceCall::Create { payload } | ResourceCall::Update { payload, .. } => {
                Some(payload)
            }
            _ => None,
        }
    }
}

/// Parses a `key=value` query argument.
pub(crate) fn parse_query_pair(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", arg)),
    }
}

/// Submits a payload to the pengecekan endpoint.
pub fn pengecekan(settings: Settings, payload_path: &Path, dry_run: bool) -> Result<(), CliError> {
    let payload = read_payload(payload_path)?;
    let client = SignedRequestClient::from_settings(settings)?;
    let output = run_pengecekan(&client, &payload, dry_run)?;
    println!("{}", output);
    Ok(())
}

/// Performs one call against a resource.
pub fn resource(
    settings: Settings,
    resource: Resource,
    call: &ResourceCall,
    dry_run: bool,
) -> Result<(), CliError> {
    let client = SignedRequestClient::from_settings(settings)?;
    let output = run_resource(&client, resource, call, dry_run)?;
    println!("{}", output);
    Ok(())
}

/// Loads a payload for `create`/`update` calls.
pub(crate) fn load_call_payload(path: &Path) -> Result<Payload, CliError> {
    let payload = read_payload(path)?;
    if payload.is_empty() {
        return Err(CliError::Input("payload must not be empty".into()));
    }
    Ok(payload)
}

fn run_pengecekan<T: Transport>(
    client: &SignedRequestClient<T>,
    payload: &Payload,
    dry_run: bool,
) -> Result<String, CliError> {
    if dry_run {
        let request = client.build_request(
            Method::Post,
            Resource::Pengecekan,
            None,
            &[],
            Some(payload),
            Utc::now(),
        )?;
        return Ok(describe_request(&request));
    }
    render(&client.pengecekan(payload)?)
}

fn run_resource<T: Transport>(
    client: &SignedRequestClient<T>,
    resource: Resource,
    call: &ResourceCall,
    dry_run: bool,
) -> Result<String, CliError> {
    if resource == Resource::Pengecekan {
        return Err(CliError::Input(
            "use the pengecekan command for verification requests".into(),
        ));
    }

    if dry_run {
        let request = client.build_request(
            call.method(),
            resource,
            call.id(),
            call.query(),
            call.payload(),
            Utc::now(),
        )?;
        return Ok(describe_request(&request));
    }

    let response = match call {
        ResourceCall::List { query } => client.list(resource, query)?,
        ResourceCall::Get { id } => client.get(resource, id)?,
        ResourceCall::Create { payload } => client.create(resource, payload)?,
        ResourceCall::Update { id, payload } => client.update(resource, id, payload)?,
        ResourceCall::Delete { id } => client.delete(resource, id)?,
    };
    render(&response)
}

fn render(value: &Value) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn describe_request(request: &HttpRequest) -> String {
    let mut out = format!("{} {}\n", request.method, request.url);
    for (name, value) in &request.headers {
        out.push_str(&format!("{}: {}\n", name, value));
    }
    if let Some(body) = &request.body {
        out.push('\n');
        out.push_str(&String::from_utf8_lossy(body));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use error_stack::Report;
    use pensiun_common::client::HttpResponse;
    use pensiun_common::error::PensiunError;
    use pensiun_common::request_signing::RequestSigner;
    use tempfile::TempDir;

    use crate::config::load_settings;
    use crate::config::tests::create_test_config;

    struct RecordingTransport {
        status: u16,
        body: &'static str,
        sent: Mutex<Vec<HttpRequest>>,
    }

    impl Transport for RecordingTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, Report<PensiunError>> {
            self.sent
                .lock()
                .expect("should lock sent requests")
                .push(request.clone());
            Ok(HttpResponse {
                status: self.status,
                body: self.body.to_string(),
            })
        }
    }

    fn client(
        status: u16,
        body: &'static str,
    ) -> (TempDir, SignedRequestClient<RecordingTransport>) {
        let dir = TempDir::new().expect("should create temp dir");
        let settings = load_settings(&create_test_config(&dir)).expect("should load settings");
        let signer = RequestSigner::from_settings(&settings).expect("should build signer");
        let transport = RecordingTransport {
            status,
            body,
            sent: Mutex::new(Vec::new()),
        };
        (dir, SignedRequestClient::new(settings, signer, transport))
    }

    fn sample_payload() -> Payload {
        Payload::new()
            .with("nip", "196501011990031001")
            .with("nama", "Budi Santoso")
    }

    #[test]
    fn test_parse_query_pair() {
        assert_eq!(
            parse_query_pair("status=aktif").expect("should parse"),
            ("status".to_string(), "aktif".to_string())
        );
        assert_eq!(
            parse_query_pair("q=a=b").expect("should parse"),
            ("q".to_string(), "a=b".to_string())
        );
        assert!(parse_query_pair("novalue").is_err());
        assert!(parse_query_pair("=x").is_err());
    }

    #[test]
    fn test_pengecekan_dry_run_does_not_send() {
        let (_dir, client) = client(200, "{}");
        let output = run_pengecekan(&client, &sample_payload(), true).expect("should build");

        assert!(output.starts_with("POST https://pensiun.example.go.id/api/pengecekan"));
        assert!(output.contains("X-Pensiun-Signature: "));
        assert!(output.contains(r#""nip":"196501011990031001""#));
    }

    #[test]
    fn test_pengecekan_renders_response() {
        let (_dir, client) = client(200, r#"{"status":"valid"}"#);
        let output = run_pengecekan(&client, &sample_payload(), false).expect("should send");
        assert!(output.contains(r#""status": "valid""#));
    }

    #[test]
    fn test_pengecekan_api_error() {
        let (_dir, client) = client(401, "invalid signature");
        match run_pengecekan(&client, &sample_payload(), false) {
            Err(CliError::Api { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid signature");
            }
            other => panic!("Expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_resource_calls_use_expected_routes() {
        let (_dir, client) = client(200, "[]");

        let list = ResourceCall::List {
            query: vec![("status".into(), "aktif".into())],
        };
        run_resource(&client, Resource::Pengajuan, &list, false).expect("should list");

        let update = ResourceCall::Update {
            id: "42".into(),
            payload: sample_payload(),
        };
        run_resource(&client, Resource::Users, &update, false).expect("should update");

        let delete = ResourceCall::Delete { id: "7".into() };
        run_resource(&client, Resource::Unit, &delete, false).expect("should delete");

        let sent = client_sent(&client);
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].method, Method::Get);
        assert_eq!(
            sent[0].url,
            "https://pensiun.example.go.id/api/pengajuan?status=aktif"
        );
        assert!(sent[0].body.is_none());
        assert_eq!(sent[1].method, Method::Put);
        assert_eq!(sent[1].url, "https://pensiun.example.go.id/api/users/42");
        assert!(sent[1].body.is_some());
        assert_eq!(sent[2].method, Method::Delete);
        assert_eq!(sent[2].url, "https://pensiun.example.go.id/api/unit/7");
    }

    #[test]
    fn test_resource_rejects_pengecekan() {
        let (_dir, client) = client(200, "{}");
        let call = ResourceCall::Get { id: "1".into() };
        assert!(matches!(
            run_resource(&client, Resource::Pengecekan, &call, false),
            Err(CliError::Input(_))
        ));
    }

    #[test]
    fn test_load_call_payload_rejects_empty() {
        let dir = TempDir::new().expect("should create temp dir");
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "{}").expect("should write");
        assert!(matches!(load_call_payload(&path), Err(CliError::Input(_))));
    }

    fn client_sent(client: &SignedRequestClient<RecordingTransport>) -> Vec<HttpRequest> {
        client
            .transport()
            .sent
            .lock()
            .expect("should lock sent requests")
            .clone()
    }
}
