use std::fmt;
use std::time::Duration;

use cogniz_core::auth::Credential;
use cogniz_core::error::ApiError;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use url::Url;

pub const API_PREFIX: &str = "/wp-json/memory/v1";
pub const CLIENT_HEADER: &str = "x-memory-platform-client";
pub const CLIENT_HEADER_VALUE: &str = "cogniz-mcp-server";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// One outbound call, built per invocation.
#[derive(Clone)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, url: Url, credential: &Credential) -> Self {
        Self {
            method,
            url,
            headers: vec![
                (AUTHORIZATION.as_str(), credential.bearer_header()),
                (CONTENT_TYPE.as_str(), "application/json".to_string()),
                (ACCEPT.as_str(), "application/json".to_string()),
                (CLIENT_HEADER, CLIENT_HEADER_VALUE.to_string()),
            ],
            query: Vec::new(),
            body: None,
        }
    }
}

// Header values are left out so the bearer token never reaches a log line.
impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| *name).collect();
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &header_names)
            .field("query", &self.query)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// `{base}/wp-json/memory/v1` followed by `segments`, each percent-encoded
/// as a single path segment.
pub fn api_url<'a>(
    base: &Url,
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<Url, ApiError> {
    let root = format!("{}{API_PREFIX}", base.as_str().trim_end_matches('/'));
    let mut url =
        Url::parse(&root).map_err(|e| ApiError::Unknown(format!("Invalid API URL: {e}")))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| ApiError::Unknown("Invalid API URL: cannot be a base".to_string()))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

/// Thin wrapper around a shared `reqwest::Client`. One attempt per call,
/// no retries.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl ApiClient {
    /// `endpoint` is the configured base URL, used in connection errors.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn execute(&self, descriptor: RequestDescriptor) -> Result<Value, ApiError> {
        let mut request = self
            .http
            .request(descriptor.method.as_reqwest(), descriptor.url)
            .timeout(self.timeout);
        for (name, value) in &descriptor.headers {
            request = request.header(*name, value);
        }
        if !descriptor.query.is_empty() {
            request = request.query(&descriptor.query);
        }
        if let Some(body) = &descriptor.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown Status"),
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.classify_transport_error(e))?;
        Ok(parse_response_body(&bytes))
    }

    fn classify_transport_error(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_connect() {
            ApiError::UnreachableHost {
                endpoint: self.endpoint.clone(),
            }
        } else {
            ApiError::Unknown(err.without_url().to_string())
        }
    }
}

fn parse_response_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn credential() -> Credential {
        Credential::new("mp_test_key").unwrap()
    }

    #[test]
    fn api_url_encodes_each_segment() {
        let base = Url::parse("https://cogniz.online/").unwrap();
        let url = api_url(&base, ["delete", "abc/../x y"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://cogniz.online/wp-json/memory/v1/delete/abc%2F..%2Fx%20y"
        );

        let nested = Url::parse("https://example.com/memory/").unwrap();
        let url = api_url(&nested, ["search"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/memory/wp-json/memory/v1/search");
    }

    #[test]
    fn response_body_parsing() {
        assert_eq!(parse_response_body(b""), Value::Null);
        assert_eq!(parse_response_body(br#"{"ok":true}"#), json!({ "ok": true }));
        assert_eq!(parse_response_body(b"deleted"), json!("deleted"));
    }

    #[test]
    fn debug_output_hides_header_values() {
        let base = Url::parse("https://cogniz.online").unwrap();
        let descriptor =
            RequestDescriptor::new(HttpMethod::Get, api_url(&base, ["projects"]).unwrap(), &credential());
        let rendered = format!("{descriptor:?}");
        assert!(rendered.contains("authorization"));
        assert!(!rendered.contains("mp_test_key"));
    }

    #[tokio::test]
    async fn execute_sends_required_headers_and_query() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/wp-json/memory/v1/search")
                    .header("authorization", "Bearer mp_test_key")
                    .header("content-type", "application/json")
                    .header("accept", "application/json")
                    .header("x-memory-platform-client", "cogniz-mcp-server")
                    .query_param("query", "rust traits")
                    .query_param("limit", "5");
                then.status(200).json_body(json!([{ "id": 1 }]));
            })
            .await;

        let base = Url::parse(&server.base_url()).unwrap();
        let mut descriptor =
            RequestDescriptor::new(HttpMethod::Get, api_url(&base, ["search"]).unwrap(), &credential());
        descriptor.query = vec![
            ("query".to_string(), "rust traits".to_string()),
            ("limit".to_string(), "5".to_string()),
        ];

        let body = ApiClient::new(server.base_url())
            .execute(descriptor)
            .await
            .expect("search should succeed");
        assert_eq!(body, json!([{ "id": 1 }]));
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn execute_maps_error_statuses() {
        let server = MockServer::start_async().await;
        for (status, path) in [(401, "/a"), (403, "/b"), (404, "/c"), (429, "/d"), (502, "/e")] {
            server
                .mock_async(|when, then| {
                    when.path(format!("{API_PREFIX}{path}"));
                    then.status(status);
                })
                .await;
        }
        let base = Url::parse(&server.base_url()).unwrap();
        let client = ApiClient::new(server.base_url());
        let mut errors = Vec::new();
        for segment in ["a", "b", "c", "d", "e"] {
            let descriptor = RequestDescriptor::new(
                HttpMethod::Get,
                api_url(&base, [segment]).unwrap(),
                &credential(),
            );
            errors.push(client.execute(descriptor).await.unwrap_err());
        }
        assert_eq!(errors[0], ApiError::Unauthenticated);
        assert_eq!(errors[1], ApiError::Forbidden);
        assert_eq!(errors[2], ApiError::NotFound);
        assert_eq!(errors[3], ApiError::RateLimited);
        assert_eq!(
            errors[4].to_string(),
            "Error: API request failed with status 502: Bad Gateway"
        );
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/wp-json/memory/v1/user-stats");
                then.status(200)
                    .delay(Duration::from_millis(1500))
                    .json_body(json!({}));
            })
            .await;
        let base = Url::parse(&server.base_url()).unwrap();
        let descriptor = RequestDescriptor::new(
            HttpMethod::Get,
            api_url(&base, ["user-stats"]).unwrap(),
            &credential(),
        );
        let err = ApiClient::new(server.base_url())
            .with_timeout(Duration::from_millis(100))
            .execute(descriptor)
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Timeout);
    }

    #[tokio::test]
    async fn refused_connection_names_the_endpoint() {
        let base = Url::parse("http://127.0.0.1:9").unwrap();
        let descriptor =
            RequestDescriptor::new(HttpMethod::Get, api_url(&base, ["projects"]).unwrap(), &credential());
        let err = ApiClient::new("http://127.0.0.1:9")
            .execute(descriptor)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error: Could not connect to http://127.0.0.1:9. Please check the URL is correct."
        );
    }
}
