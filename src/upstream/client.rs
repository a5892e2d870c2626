//! `reqwest`-backed implementation of [`ShiftApi`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};

use super::ShiftApi;
use crate::error::UpstreamError;
use crate::metrics::MetricsCollector;
use crate::shift::{ScheduledShift, Shift};

/// Default request timeout for scheduling API calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of `GET /shifts`. Entries stay untyped so one odd entry cannot
/// fail the whole listing.
#[derive(Debug, Deserialize)]
struct ShiftListResponse {
    #[serde(default)]
    shifts: Vec<Value>,
}

impl ShiftListResponse {
    fn into_scheduled(self) -> Vec<ScheduledShift> {
        self.shifts
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Object(fields) => Some(ScheduledShift::from_fields(fields)),
                other => {
                    tracing::debug!(entry = %other, "Ignoring non-object shift listing entry");
                    None
                }
            })
            .collect()
    }
}

/// HTTP client for the scheduling API.
#[derive(Debug, Clone)]
pub struct HttpShiftApi {
    /// Base URL, without a trailing slash.
    api_base: String,
    http_client: Client,
    metrics: MetricsCollector,
}

impl HttpShiftApi {
    /// Create a client for the API rooted at `api_base`.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL of the scheduling API (e.g., "http://localhost:8181")
    /// * `timeout` - Per-request timeout
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            api_base,
            http_client,
            metrics: MetricsCollector::new(),
        })
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn record(&self, operation: &str, success: bool, started: Instant) {
        self.metrics
            .record_upstream_request(operation, success, started.elapsed().as_secs_f64());
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
    Err(UpstreamError::ApiError {
        code: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ShiftApi for HttpShiftApi {
    async fn post_shift(&self, shift: &Shift) -> Result<(), UpstreamError> {
        let url = format!("{}/shift", self.api_base);
        let started = Instant::now();

        let result: Result<(), UpstreamError> = async {
            let response = self.http_client.post(&url).json(shift).send().await?;
            error_for_status(response).await?;
            Ok(())
        }
        .await;

        self.record("post_shift", result.is_ok(), started);
        if let Err(ref e) = result {
            tracing::debug!(url = %url, user_id = %shift.user_id, error = %e, "Shift post failed");
        }
        result
    }

    async fn list_shifts(&self) -> Result<Vec<ScheduledShift>, UpstreamError> {
        let url = format!("{}/shifts", self.api_base);
        let started = Instant::now();

        let result: Result<Vec<ScheduledShift>, UpstreamError> = async {
            let response = self.http_client.get(&url).send().await?;
            let response = error_for_status(response).await?;
            let body: ShiftListResponse = response.json().await?;
            Ok(body.into_scheduled())
        }
        .await;

        self.record("list_shifts", result.is_ok(), started);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample() -> Shift {
        Shift::new("acme", "user-1", "09:00", "17:00", "create")
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let api = HttpShiftApi::new("http://localhost:8181//", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(api.api_base(), "http://localhost:8181");
    }

    #[tokio::test]
    async fn test_post_shift_sends_camel_case_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/shift"))
            .and(body_json(serde_json::json!({
                "companyId": "acme",
                "userId": "user-1",
                "startTime": "09:00",
                "endTime": "17:00",
                "action": "create"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpShiftApi::new(server.uri(), DEFAULT_TIMEOUT).unwrap();
        api.post_shift(&sample()).await.unwrap();
    }

    #[tokio::test]
    async fn test_post_shift_reports_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/shift"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let api = HttpShiftApi::new(server.uri(), DEFAULT_TIMEOUT).unwrap();
        let err = api.post_shift(&sample()).await.unwrap_err();
        match err {
            UpstreamError::ApiError { code, message } => {
                assert_eq!(code, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_shifts_parses_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shifts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "shifts": [{
                    "companyId": "acme",
                    "userId": "user-1",
                    "startTime": "09:00",
                    "endTime": "17:00",
                    "action": "create"
                }]
            })))
            .mount(&server)
            .await;

        let api = HttpShiftApi::new(server.uri(), DEFAULT_TIMEOUT).unwrap();
        let shifts = api.list_shifts().await.unwrap();
        assert_eq!(shifts.len(), 1);
        assert!(shifts[0].matches(&sample()));
    }

    #[tokio::test]
    async fn test_list_shifts_keeps_valid_entries_next_to_odd_ones() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shifts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "shifts": [
                    {
                        "companyId": "acme",
                        "userId": "user-1",
                        "startTime": "09:00",
                        "endTime": "17:00"
                    },
                    {
                        "companyId": "acme",
                        "userId": 42,
                        "startTime": null,
                        "endTime": "17:00"
                    },
                    "garbage"
                ]
            })))
            .mount(&server)
            .await;

        let api = HttpShiftApi::new(server.uri(), DEFAULT_TIMEOUT).unwrap();
        let shifts = api.list_shifts().await.unwrap();
        assert_eq!(shifts.len(), 2);
        assert!(shifts[0].matches(&sample()));
        assert!(shifts[1].key().is_none());
        assert_eq!(shifts[1].get("userId"), Some(&serde_json::json!(42)));
    }

    #[tokio::test]
    async fn test_list_shifts_missing_field_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shifts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let api = HttpShiftApi::new(server.uri(), DEFAULT_TIMEOUT).unwrap();
        assert!(api.list_shifts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_shifts_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shifts"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let api = HttpShiftApi::new(server.uri(), DEFAULT_TIMEOUT).unwrap();
        assert!(matches!(
            api.list_shifts().await,
            Err(UpstreamError::ParseError(_))
        ));
    }
}
