//! HTTP client for the coordinating server
//!
//! The coordinator exposes one resource per calculation:
//! `GET  <host>/api/calculations/remote/<id>` returns the inputs,
//! `POST <host>/api/calculations/remote/<id>` accepts the result, and
//! `POST <host>/api/calculations/logs/<id>` takes raw log text.

use async_trait::async_trait;
use patchwork_core::{CalcError, CalculationContext, CalculationResponse, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument};

/// Operations the pipeline needs from the coordinator (allows mocking in tests)
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Fetch the inputs of a calculation
    async fn fetch_context(&self, calculation: &str) -> Result<CalculationContext>;

    /// Upload the packaged result of a calculation
    async fn submit_result(&self, calculation: &str, response: &CalculationResponse)
        -> Result<()>;

    /// Post raw log text for a calculation
    async fn submit_logs(&self, calculation: &str, text: &str) -> Result<()>;
}

/// Real coordinator client over authenticated HTTP
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    host: String,
    token: String,
    http: reqwest::Client,
}

impl CoordinatorClient {
    /// Create a client for `host`; a trailing slash on the host is ignored
    pub fn new(host: &str, token: impl Into<String>) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Base URL of the coordinator
    pub fn host(&self) -> &str {
        &self.host
    }

    fn remote_url(&self, calculation: &str) -> String {
        format!("{}/api/calculations/remote/{}", self.host, calculation)
    }

    fn logs_url(&self, calculation: &str) -> String {
        format!("{}/api/calculations/logs/{}", self.host, calculation)
    }
}

/// Turn anything but 200 into a protocol error
fn ensure_ok(response: Response) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::OK {
        Ok(response)
    } else {
        Err(CalcError::Protocol {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("Unknown status")
                .to_string(),
        })
    }
}

#[async_trait]
impl Coordinator for CoordinatorClient {
    #[instrument(skip(self), fields(host = %self.host))]
    async fn fetch_context(&self, calculation: &str) -> Result<CalculationContext> {
        let url = self.remote_url(calculation);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| CalcError::Network(format!("Failed to fetch context: {}", e)))?;

        let body = ensure_ok(response)?
            .bytes()
            .await
            .map_err(|e| CalcError::Network(format!("Failed to read context body: {}", e)))?;

        serde_json::from_slice(&body)
            .map_err(|e| CalcError::Format(format!("Invalid calculation context: {}", e)))
    }

    #[instrument(skip(self, response), fields(host = %self.host))]
    async fn submit_result(
        &self,
        calculation: &str,
        response: &CalculationResponse,
    ) -> Result<()> {
        let url = self.remote_url(calculation);
        let body = serde_json::to_vec(response)?;
        debug!("POST {} ({} bytes)", url, body.len());

        let reply = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| CalcError::Network(format!("Failed to upload result: {}", e)))?;

        ensure_ok(reply).map(|_| ())
    }

    #[instrument(skip(self, text), fields(host = %self.host))]
    async fn submit_logs(&self, calculation: &str, text: &str) -> Result<()> {
        let url = self.logs_url(calculation);
        debug!("POST {} ({} bytes)", url, text.len());

        let reply = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "text/plain")
            .body(text.to_string())
            .send()
            .await
            .map_err(|e| CalcError::Network(format!("Failed to submit logs: {}", e)))?;

        ensure_ok(reply).map(|_| ())
    }
}

/// In-memory coordinator for testing
#[derive(Default)]
pub struct MockCoordinator {
    contexts: HashMap<String, CalculationContext>,
    submitted: Mutex<Vec<(String, CalculationResponse)>>,
    logs: Mutex<Vec<(String, String)>>,
}

impl MockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, calculation: &str, context: CalculationContext) -> Self {
        self.contexts.insert(calculation.to_string(), context);
        self
    }

    /// Results received so far, in arrival order
    pub fn submitted(&self) -> Vec<(String, CalculationResponse)> {
        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Log texts received so far, in arrival order
    pub fn submitted_logs(&self) -> Vec<(String, String)> {
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Coordinator for MockCoordinator {
    async fn fetch_context(&self, calculation: &str) -> Result<CalculationContext> {
        self.contexts
            .get(calculation)
            .cloned()
            .ok_or_else(|| CalcError::Protocol {
                status: 404,
                message: "Not Found".to_string(),
            })
    }

    async fn submit_result(
        &self,
        calculation: &str,
        response: &CalculationResponse,
    ) -> Result<()> {
        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((calculation.to_string(), response.clone()));
        Ok(())
    }

    async fn submit_logs(&self, calculation: &str, text: &str) -> Result<()> {
        self.logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((calculation.to_string(), text.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;

    type Captured = Arc<Mutex<Vec<(String, String, String)>>>;

    async fn spawn_coordinator(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn header(headers: &HeaderMap, name: &str) -> String {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn test_fetch_context_sends_bearer_and_accept() {
        let router = Router::new().route(
            "/api/calculations/remote/:id",
            get(|Path(id): Path<String>, headers: HeaderMap| async move {
                if header(&headers, "authorization") != "Bearer secret"
                    || header(&headers, "accept") != "application/json"
                {
                    return Err(AxumStatus::UNAUTHORIZED);
                }
                Ok(Json(json!({
                    "id": {"id": id},
                    "owner": "alice",
                    "inputs": {"a": 5}
                })))
            }),
        );
        let base = spawn_coordinator(router).await;

        let client = CoordinatorClient::new(&format!("{}/", base), "secret");
        assert_eq!(client.host(), base);

        let context = client.fetch_context("calc-7").await.unwrap();
        assert_eq!(context.id.id, "calc-7");
        assert_eq!(context.owner, "alice");
        assert_eq!(context.inputs.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_context_non_200_is_protocol_error() {
        let router = Router::new().route(
            "/api/calculations/remote/:id",
            get(|| async { AxumStatus::NOT_FOUND }),
        );
        let base = spawn_coordinator(router).await;

        let err = CoordinatorClient::new(&base, "t")
            .fetch_context("missing")
            .await
            .unwrap_err();
        assert!(matches!(err, CalcError::Protocol { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_context_bad_body_is_format_error() {
        let router = Router::new().route(
            "/api/calculations/remote/:id",
            get(|| async { "this is not json" }),
        );
        let base = spawn_coordinator(router).await;

        let err = CoordinatorClient::new(&base, "t")
            .fetch_context("c")
            .await
            .unwrap_err();
        assert!(matches!(err, CalcError::Format(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = CoordinatorClient::new(&format!("http://{}", addr), "t")
            .fetch_context("c")
            .await
            .unwrap_err();
        assert!(matches!(err, CalcError::Network(_)));
    }

    #[tokio::test]
    async fn test_submit_result_posts_json() {
        let captured: Captured = Arc::default();
        let router = Router::new()
            .route(
                "/api/calculations/remote/:id",
                post(
                    |State(captured): State<Captured>,
                     Path(id): Path<String>,
                     headers: HeaderMap,
                     body: String| async move {
                        captured.lock().unwrap().push((
                            id,
                            header(&headers, "content-type"),
                            body,
                        ));
                        AxumStatus::OK
                    },
                ),
            )
            .with_state(captured.clone());
        let base = spawn_coordinator(router).await;

        let mut response = CalculationResponse::default();
        response.outputs.insert("b".to_string(), json!(5).into());
        response.errors.push("warning".to_string());

        CoordinatorClient::new(&base, "t")
            .submit_result("calc-1", &response)
            .await
            .unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (id, content_type, body) = &captured[0];
        assert_eq!(id, "calc-1");
        assert_eq!(content_type, "application/json");
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(
            body,
            json!({"outputs": {"b": 5}, "logs": [], "errors": ["warning"]})
        );
    }

    #[tokio::test]
    async fn test_submit_result_rejected() {
        let router = Router::new().route(
            "/api/calculations/remote/:id",
            post(|| async { AxumStatus::INTERNAL_SERVER_ERROR }),
        );
        let base = spawn_coordinator(router).await;

        let err = CoordinatorClient::new(&base, "t")
            .submit_result("c", &CalculationResponse::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CalcError::Protocol { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_submit_logs_posts_plain_text() {
        let captured: Captured = Arc::default();
        let router = Router::new()
            .route(
                "/api/calculations/logs/:id",
                post(
                    |State(captured): State<Captured>,
                     Path(id): Path<String>,
                     headers: HeaderMap,
                     body: String| async move {
                        captured.lock().unwrap().push((
                            id,
                            header(&headers, "content-type"),
                            body,
                        ));
                        AxumStatus::OK
                    },
                ),
            )
            .with_state(captured.clone());
        let base = spawn_coordinator(router).await;

        CoordinatorClient::new(&base, "t")
            .submit_logs("calc-2", "line one\nline two")
            .await
            .unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(
            captured[0],
            (
                "calc-2".to_string(),
                "text/plain".to_string(),
                "line one\nline two".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_mock_coordinator() {
        let mock = MockCoordinator::new().with_context("known", CalculationContext::default());

        assert!(mock.fetch_context("known").await.is_ok());
        assert!(matches!(
            mock.fetch_context("unknown").await,
            Err(CalcError::Protocol { status: 404, .. })
        ));

        mock.submit_result("known", &CalculationResponse::default())
            .await
            .unwrap();
        assert_eq!(mock.submitted().len(), 1);
    }
}
