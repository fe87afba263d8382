use std::fmt;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cloudflare::types::{ApiErrorEnvelope, PurgeCacheRequest, ZoneList};

pub const DEFAULT_ENDPOINT: &str = "https://api.cloudflare.com/client/v4/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// HTTP verbs the Cloudflare API is called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    fn method(self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Patch => Method::PATCH,
            Verb::Delete => Method::DELETE,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method().as_str())
    }
}

/// Errors raised while constructing a [`CloudflareClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Cloudflare API token missing")]
    MissingToken,

    #[error("invalid API token header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("HTTP client error: {0}")]
    HttpClientBuild(#[from] reqwest::Error),
}

/// Why a single API call did not produce a usable body.
#[derive(Debug, Clone, Error)]
pub enum RequestFailure {
    #[error("HTTP {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("{0}")]
    Transport(String),

    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Snapshot of the most recent outbound request.
#[derive(Debug, Clone)]
pub struct LastRequest {
    pub verb: Verb,
    pub url: String,
    pub payload: Value,
}

/// Snapshot of the most recent response. `body` is `Null` when it was not JSON.
#[derive(Debug, Clone)]
pub struct LastResponse {
    pub status: StatusCode,
    pub body: Value,
    pub headers: HeaderMap,
}

/// Authenticated Cloudflare API client.
///
/// Each call overwrites the "last call" diagnostics, so callers that share one
/// instance must hold it exclusively while they call and inspect it.
#[derive(Debug)]
pub struct CloudflareClient {
    http: Client,
    endpoint: String,
    timeout: Duration,
    succeeded: bool,
    last_error: Option<RequestFailure>,
    last_request: Option<LastRequest>,
    last_response: Option<LastResponse>,
}

impl CloudflareClient {
    pub fn new(api_token: &str) -> Result<Self, ClientError> {
        Self::with_endpoint(api_token, DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(api_token: &str, endpoint: &str) -> Result<Self, ClientError> {
        let api_token = api_token.trim();
        if api_token.is_empty() {
            return Err(ClientError::MissingToken);
        }

        let mut headers = HeaderMap::new();
        let mut auth_value = HeaderValue::from_str(&format!("Bearer {api_token}"))?;
        auth_value.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth_value);
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let http = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/", endpoint.trim_end_matches('/')),
            timeout: DEFAULT_TIMEOUT,
            succeeded: false,
            last_error: None,
            last_request: None,
            last_response: None,
        })
    }

    /// Replace the timeout used by the verb helpers.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether the last call returned a 2xx response.
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn last_error(&self) -> Option<&RequestFailure> {
        self.last_error.as_ref()
    }

    pub fn last_request(&self) -> Option<&LastRequest> {
        self.last_request.as_ref()
    }

    pub fn last_response(&self) -> Option<&LastResponse> {
        self.last_response.as_ref()
    }

    pub async fn get(&mut self, path: &str, params: &Value) -> Result<Value, RequestFailure> {
        self.call(Verb::Get, path, params, self.timeout).await
    }

    pub async fn post(&mut self, path: &str, payload: &Value) -> Result<Value, RequestFailure> {
        self.call(Verb::Post, path, payload, self.timeout).await
    }

    pub async fn put(&mut self, path: &str, payload: &Value) -> Result<Value, RequestFailure> {
        self.call(Verb::Put, path, payload, self.timeout).await
    }

    pub async fn patch(&mut self, path: &str, payload: &Value) -> Result<Value, RequestFailure> {
        self.call(Verb::Patch, path, payload, self.timeout).await
    }

    pub async fn delete(&mut self, path: &str, payload: &Value) -> Result<Value, RequestFailure> {
        self.call(Verb::Delete, path, payload, self.timeout).await
    }

    /// Issue one API call. GET sends `payload` as the query string, every other
    /// verb as a JSON body. Returns the decoded body on 2xx.
    pub async fn call(
        &mut self,
        verb: Verb,
        path: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Value, RequestFailure> {
        self.succeeded = false;
        self.last_error = None;

        let url = format!("{}{}", self.endpoint, path.trim_start_matches('/'));
        self.last_request = Some(LastRequest {
            verb,
            url: url.clone(),
            payload: payload.clone(),
        });

        let mut req = self.http.request(verb.method(), &url).timeout(timeout);
        if !is_empty_payload(payload) {
            req = match (verb, payload) {
                (Verb::Get, Value::Object(params)) => req.query(params),
                _ => req.json(payload),
            };
        }

        debug!(%verb, %url, "calling Cloudflare API");

        let outcome = match req.send().await {
            Ok(res) => {
                let status = res.status();
                let headers = res.headers().clone();
                match res.text().await {
                    Ok(text) => {
                        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
                        self.last_response = Some(LastResponse {
                            status,
                            body: body.clone(),
                            headers,
                        });
                        if status.is_success() {
                            Ok(body)
                        } else {
                            Err(RequestFailure::Status {
                                status,
                                message: failure_message(status, &text),
                            })
                        }
                    }
                    Err(err) => {
                        self.last_response = None;
                        Err(RequestFailure::Transport(err.to_string()))
                    }
                }
            }
            Err(err) => {
                self.last_response = None;
                Err(RequestFailure::Transport(err.to_string()))
            }
        };

        match outcome {
            Ok(body) => {
                self.succeeded = true;
                Ok(body)
            }
            Err(failure) => {
                warn!(%verb, %url, error = %failure, "Cloudflare API call failed");
                self.last_error = Some(failure.clone());
                Err(failure)
            }
        }
    }

    /// Look up the zone whose name matches `name` exactly.
    pub async fn find_zone_id(&mut self, name: &str) -> Result<Option<String>, RequestFailure> {
        let body = self.get("zones", &json!({ "name": name })).await?;
        let zones: ZoneList =
            serde_json::from_value(body).map_err(|e| RequestFailure::Decode(e.to_string()))?;

        Ok(zones
            .result
            .into_iter()
            .find(|zone| !zone.id.is_empty() && zone.name.eq_ignore_ascii_case(name))
            .map(|zone| zone.id))
    }

    /// Purge every cached asset of a zone.
    pub async fn purge_everything(&mut self, zone_id: &str) -> Result<Value, RequestFailure> {
        let payload = serde_json::to_value(PurgeCacheRequest {
            purge_everything: true,
        })
        .map_err(|e| RequestFailure::Decode(e.to_string()))?;

        self.post(&format!("zones/{zone_id}/purge_cache"), &payload)
            .await
    }
}

fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn failure_message(status: StatusCode, text: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(text) {
        let messages: Vec<String> = envelope
            .errors
            .into_iter()
            .map(|e| match e.code {
                Some(code) => format!("{} ({code})", e.message),
                None => e.message,
            })
            .collect();
        if !messages.is_empty() {
            return messages.join("; ");
        }
    }

    let text = text.trim();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path, query_param},
    };

    async fn client_for(server: &MockServer) -> CloudflareClient {
        CloudflareClient::with_endpoint("test-token", &format!("{}/client/v4", server.uri()))
            .unwrap()
    }

    #[test]
    fn test_missing_token_fails_construction() {
        assert!(matches!(
            CloudflareClient::new(""),
            Err(ClientError::MissingToken)
        ));
        assert!(matches!(
            CloudflareClient::new("   "),
            Err(ClientError::MissingToken)
        ));
    }

    #[test]
    fn test_endpoint_is_normalized() {
        let client = CloudflareClient::with_endpoint("t", "https://api.example.test/v4//").unwrap();
        assert_eq!(client.endpoint(), "https://api.example.test/v4/");
    }

    #[tokio::test]
    async fn test_get_sends_bearer_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/client/v4/zones"))
            .and(query_param("name", "example.com"))
            .and(header("authorization", "Bearer test-token"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": [{ "id": "zone-1", "name": "example.com" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&server).await;
        let zone_id = client.find_zone_id("example.com").await.unwrap();

        assert_eq!(zone_id.as_deref(), Some("zone-1"));
        assert!(client.succeeded());
        assert!(client.last_error().is_none());
        let req = client.last_request().unwrap();
        assert_eq!(req.verb, Verb::Get);
        assert!(req.url.ends_with("/client/v4/zones"));
        assert_eq!(client.last_response().unwrap().status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_find_zone_id_without_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/client/v4/zones"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "success": true, "result": [] })),
            )
            .mount(&server)
            .await;

        let mut client = client_for(&server).await;
        assert_eq!(client.find_zone_id("missing.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_zone_id_requires_exact_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/client/v4/zones"))
            .and(query_param("name", "a.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": [
                    { "id": "zone-other", "name": "other.com" },
                    { "id": "zone-a", "name": "A.com" }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/client/v4/zones"))
            .and(query_param("name", "b.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": [{ "id": "zone-x", "name": "x.b.com" }]
            })))
            .mount(&server)
            .await;

        let mut client = client_for(&server).await;
        assert_eq!(
            client.find_zone_id("a.com").await.unwrap().as_deref(),
            Some("zone-a")
        );
        assert_eq!(client.find_zone_id("b.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_posts_purge_everything() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/client/v4/zones/zone-1/purge_cache"))
            .and(body_json(json!({ "purge_everything": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": { "id": "zone-1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&server).await;
        let body = client.purge_everything("zone-1").await.unwrap();
        assert_eq!(body["result"]["id"], "zone-1");
    }

    #[tokio::test]
    async fn test_non_success_records_error_and_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/client/v4/zones/zone-1/purge_cache"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "success": false,
                "errors": [{ "code": 10000, "message": "Authentication error" }]
            })))
            .mount(&server)
            .await;

        let mut client = client_for(&server).await;
        let err = client.purge_everything("zone-1").await.unwrap_err();

        assert!(matches!(
            err,
            RequestFailure::Status { status: StatusCode::FORBIDDEN, .. }
        ));
        assert!(!client.succeeded());
        assert_eq!(
            client.last_error().unwrap().to_string(),
            "HTTP 403 Forbidden: Authentication error (10000)"
        );
        let res = client.last_response().unwrap();
        assert_eq!(res.status, StatusCode::FORBIDDEN);
        assert_eq!(res.body["success"], false);
    }

    #[tokio::test]
    async fn test_plain_text_failure_uses_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/client/v4/things/1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let mut client = client_for(&server).await;
        let err = client.delete("/things/1", &Value::Null).await.unwrap_err();

        assert_eq!(err.to_string(), "HTTP 500 Internal Server Error: upstream exploded");
        assert_eq!(client.last_response().unwrap().body, Value::Null);
    }

    #[tokio::test]
    async fn test_success_resets_previous_error() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/client/v4/bad"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/client/v4/good"))
            .and(body_json(json!({ "value": 1 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .mount(&server)
            .await;

        let mut client = client_for(&server).await;
        assert!(client.patch("bad", &json!({})).await.is_err());
        assert_eq!(
            client.last_error().unwrap().to_string(),
            "HTTP 400 Bad Request: Bad Request"
        );

        client.put("good", &json!({ "value": 1 })).await.unwrap();
        assert!(client.succeeded());
        assert!(client.last_error().is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_clears_last_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [] })))
            .mount(&server)
            .await;

        let mut client = client_for(&server).await;
        client.get("zones", &Value::Null).await.unwrap();
        assert!(client.last_response().is_some());

        let mut client = CloudflareClient::with_endpoint("t", "http://127.0.0.1:1/").unwrap();
        let err = client.get("zones", &Value::Null).await.unwrap_err();
        assert!(matches!(err, RequestFailure::Transport(_)));
        assert!(client.last_response().is_none());
        assert!(client.last_request().is_some());
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "result": [] }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let mut client = client_for(&server).await;
        let err = client
            .call(Verb::Get, "zones", &Value::Null, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, RequestFailure::Transport(_)));
        assert!(!client.succeeded());
    }
}
