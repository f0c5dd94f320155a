//! BCMI registry connector implementation
//!
//! Implements [`RegistrySource`] for the BC mines registry (mem-admin API).

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use bridge_traits::registry::{RawRecord, RegistrySource};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::BcmiError;

/// Public BCMI deployment
pub const BCMI_BASE_URL: &str = "https://mines.empr.gov.bc.ca";

/// Longest error body excerpt carried into an error message
const MAX_ERROR_BODY: usize = 200;

/// BCMI registry connector
///
/// Every call is a single attempt; a failed fetch is reported and the
/// record stays pending until the next run.
///
/// # Example
///
/// ```ignore
/// use provider_bcmi::BcmiConnector;
/// use bridge_traits::registry::RegistrySource;
///
/// let connector = BcmiConnector::new(http_client, BCMI_BASE_URL);
/// let mines = connector.published_projects().await?;
/// ```
pub struct BcmiConnector {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout: Duration,
}

impl BcmiConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    /// Parse a response body into raw records.
    ///
    /// The body must be a JSON array whose elements are all objects.
    fn parse_records(body: &[u8]) -> std::result::Result<Vec<RawRecord>, BcmiError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| BcmiError::ParseError(format!("Invalid JSON: {}", e)))?;

        let Value::Array(items) = value else {
            return Err(BcmiError::ParseError(format!(
                "Expected a JSON array, got {}",
                json_kind(&value)
            )));
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                RawRecord::try_from(item).map_err(|other| {
                    BcmiError::ParseError(format!(
                        "Element {} is {}, expected an object",
                        index,
                        json_kind(&other)
                    ))
                })
            })
            .collect()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn body_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    text.chars().take(MAX_ERROR_BODY).collect()
}

#[async_trait]
impl RegistrySource for BcmiConnector {
    #[instrument(skip(self, query), fields(endpoint = %endpoint))]
    async fn fetch(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Vec<RawRecord>> {
        let request = HttpRequest::new(HttpMethod::Get, self.endpoint_url(endpoint))
            .query(query)
            .header("Accept", "application/json")
            .timeout(self.timeout);

        debug!(url = %request.url, "Fetching from BCMI");

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::single_attempt())
            .await?;

        if !response.is_success() {
            warn!(status = response.status, "BCMI request failed");
            return Err(BcmiError::ApiError {
                status_code: response.status,
                message: body_excerpt(&response.body),
            }
            .into());
        }

        let records = Self::parse_records(&response.body)?;

        info!(count = records.len(), "Fetched records from BCMI");

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::http::HttpResponse;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn test_endpoint_url() {
        let connector = BcmiConnector::new(Arc::new(MockHttpClient::new()), "https://bcmi.test/");

        assert_eq!(
            connector.endpoint_url("/api/projects/published"),
            "https://bcmi.test/api/projects/published"
        );
        assert_eq!(connector.endpoint_url("api/x"), "https://bcmi.test/api/x");
    }

    #[test]
    fn test_parse_records_rejects_non_arrays() {
        let err = BcmiConnector::parse_records(br#"{"projects": []}"#).unwrap_err();
        assert!(err.to_string().contains("Expected a JSON array, got an object"));

        let err = BcmiConnector::parse_records(br#"[{"id": 1}, "x"]"#).unwrap_err();
        assert!(err.to_string().contains("Element 1 is a string"));

        let err = BcmiConnector::parse_records(b"not json").unwrap_err();
        assert!(matches!(err, BcmiError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_published_projects_success() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.url, "https://bcmi.test/api/projects/published");
            assert_eq!(req.method, HttpMethod::Get);
            Ok(response(
                200,
                r#"[{"_id": "5c1", "code": "M-100", "name": "Red Chris"},
                    {"_id": "5c2", "code": "M-200", "name": "Brucejack"}]"#,
            ))
        });

        let connector = BcmiConnector::new(Arc::new(mock_http), "https://bcmi.test");
        let records = connector.published_projects().await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].remote_id(), Some("5c1".to_string()));
        assert_eq!(records[1].get("code"), Some(&Value::from("M-200")));
    }

    #[tokio::test]
    async fn test_project_collections_url_is_encoded() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(
                req.url,
                "https://bcmi.test/api/collections/project/M%20100?page=2"
            );
            Ok(response(200, "[]"))
        });

        let connector = BcmiConnector::new(Arc::new(mock_http), "https://bcmi.test");
        let records = connector
            .fetch("/api/collections/project/M%20100", &[("page", "2")])
            .await
            .unwrap();

        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_remote_unavailable_without_retry() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(500, "Internal Server Error")));

        let connector = BcmiConnector::new(Arc::new(mock_http), "https://bcmi.test");
        let err = connector.project_collections("M-200").await.unwrap_err();

        match err {
            BridgeError::RemoteUnavailable {
                status_code,
                message,
            } => {
                assert_eq!(status_code, Some(500));
                assert_eq!(message, "Internal Server Error");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|_| {
            Err(BridgeError::RemoteUnavailable {
                status_code: None,
                message: "Connection failed".to_string(),
            })
        });

        let connector = BcmiConnector::new(Arc::new(mock_http), "https://bcmi.test");
        let err = connector.published_projects().await.unwrap_err();

        assert_eq!(err.status_code(), None);
        assert!(matches!(err, BridgeError::RemoteUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_object_body_is_malformed_payload() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"error": "maintenance"}"#)));

        let connector = BcmiConnector::new(Arc::new(mock_http), "https://bcmi.test");
        let err = connector.published_projects().await.unwrap_err();

        assert!(matches!(err, BridgeError::MalformedPayload(_)));
    }
}
