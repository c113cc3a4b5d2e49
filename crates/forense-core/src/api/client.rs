//! Dispatcher for the image analysis endpoint.
//!
//! `AnalysisClient` submits an image through the session manager and turns
//! the response into an `AnalysisResult`. When the API cannot be reached it
//! answers with the canned demonstration result instead of failing.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::auth::SessionManager;
use crate::config::Config;
use crate::models::AnalysisResult;

use super::{ApiError, HttpRequest};

const ANALYZE_PATH: &str = "/api/analyze-image";

/// Multipart field the server reads the image from
const FILE_FIELD: &str = "file";

/// Pause before the demonstration result, so offline use still feels like
/// a round trip to the server.
const DEFAULT_DEMO_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct AnalysisClient {
    session: Arc<SessionManager>,
    demo_delay: Duration,
}

impl AnalysisClient {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            session,
            demo_delay: DEFAULT_DEMO_DELAY,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let session = SessionManager::from_config(config)?;
        Ok(Self::new(Arc::new(session)).with_demo_delay(config.demo_delay()))
    }

    pub fn with_demo_delay(mut self, delay: Duration) -> Self {
        self.demo_delay = delay;
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Submit an image for analysis.
    ///
    /// Only an unreachable API falls back to the demonstration result;
    /// quota, auth and server errors always propagate.
    pub async fn analyze_image(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<AnalysisResult, ApiError> {
        match self.submit(bytes, file_name).await {
            Err(e) if e.is_network_unreachable() => {
                warn!(error = %e, file = file_name, "Analysis API unreachable, using demonstration result");
                tokio::time::sleep(self.demo_delay).await;
                Ok(AnalysisResult::demo())
            }
            other => other,
        }
    }

    async fn submit(&self, bytes: Vec<u8>, file_name: &str) -> Result<AnalysisResult, ApiError> {
        debug!(file = file_name, size = bytes.len(), "Submitting image");
        let request = HttpRequest::post(ANALYZE_PATH).multipart(
            FILE_FIELD,
            file_name,
            bytes,
            mime_for(file_name),
        );

        let response = self.session.authenticated_request(request).await?;
        match response.status {
            StatusCode::TOO_MANY_REQUESTS => Err(ApiError::QuotaExceeded),
            status if !status.is_success() => Err(ApiError::Analysis {
                status: status.as_u16(),
                body: ApiError::truncate_body(&response.text()),
            }),
            _ => response.json(),
        }
    }
}

/// MIME type guessed from the file extension
fn mime_for(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RequestBody;
    use crate::auth::{CredentialSet, MemoryStore, Storage, TOKENS_KEY};
    use crate::models::Verdict;
    use crate::testing::{token_body, FakeTransport};
    use chrono::Utc;
    use reqwest::Method;
    use serde_json::json;

    fn client_with_session(transport: &Arc<FakeTransport>) -> AnalysisClient {
        let store = Arc::new(MemoryStore::new());
        let creds = CredentialSet {
            access_token: "live".to_string(),
            refresh_token: "live-refresh".to_string(),
            expires_in: 3600,
            issued_at: Utc::now(),
        };
        let raw = serde_json::to_string(&creds).expect("serializable");
        store.set(TOKENS_KEY, &raw).expect("seed");
        AnalysisClient::new(Arc::new(SessionManager::new(transport.clone(), store)))
    }

    fn result_body() -> serde_json::Value {
        json!({
            "automated_analysis": {"final_score": 0.12, "confidence": "high"},
            "gemini_analysis": {"verdict": "REAL"},
            "annotated_image": "",
            "details": {}
        })
    }

    #[tokio::test]
    async fn test_analyze_image_success() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(Method::POST, ANALYZE_PATH, 200, result_body());
        let client = client_with_session(&transport);

        let result = client
            .analyze_image(vec![0x89, 0x50], "Photo.PNG")
            .await
            .expect("analysis should succeed");

        assert_eq!(result.gemini_analysis.verdict, Verdict::Real);
        assert!(!result.demo);

        let sent = &transport.requests()[0];
        assert!(sent.headers.get("content-type").is_none());
        match &sent.body {
            RequestBody::Multipart {
                field,
                file_name,
                bytes,
                mime,
            } => {
                assert_eq!(*field, "file");
                assert_eq!(file_name, "Photo.PNG");
                assert_eq!(bytes, &vec![0x89, 0x50]);
                assert_eq!(mime, "image/png");
            }
            other => panic!("expected multipart body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_quota_exceeded_suggests_custom_key() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(Method::POST, ANALYZE_PATH, 429, json!({"detail": "quota"}));
        let client = client_with_session(&transport);

        let err = client
            .analyze_image(vec![1], "a.jpg")
            .await
            .expect_err("429 must fail");

        assert_eq!(err, ApiError::QuotaExceeded);
        assert!(err.to_string().contains("your own Gemini key"));
    }

    #[tokio::test]
    async fn test_server_error_embeds_status_and_body() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond_text(Method::POST, ANALYZE_PATH, 500, "detector crashed");
        let client = client_with_session(&transport);

        let err = client
            .analyze_image(vec![1], "a.jpg")
            .await
            .expect_err("500 must fail");

        assert_eq!(
            err,
            ApiError::Analysis {
                status: 500,
                body: "detector crashed".to_string()
            }
        );
        let message = err.to_string();
        assert!(message.contains("500"));
        assert!(message.contains("detector crashed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_api_returns_demo_after_delay() {
        let transport = Arc::new(FakeTransport::new());
        let client = client_with_session(&transport);
        let started = tokio::time::Instant::now();

        let result = client
            .analyze_image(vec![1], "a.webp")
            .await
            .expect("network failure falls back to the demo");

        assert!(result.demo);
        assert_eq!(result, AnalysisResult::demo());
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_session_returns_demo() {
        let transport = Arc::new(FakeTransport::new());
        let session = Arc::new(SessionManager::new(
            transport.clone(),
            Arc::new(MemoryStore::new()),
        ));
        session.initialize_session().await;
        assert!(session.is_offline());

        let client = AnalysisClient::new(session).with_demo_delay(Duration::from_millis(10));
        let result = client
            .analyze_image(vec![1], "a.png")
            .await
            .expect("offline falls back to the demo");

        assert!(result.demo);
        assert_eq!(transport.count(&Method::POST, ANALYZE_PATH), 0);
    }

    #[tokio::test]
    async fn test_expired_session_is_not_masked() {
        let transport = Arc::new(FakeTransport::new());
        transport
            .respond(Method::POST, ANALYZE_PATH, 401, json!({}))
            .respond(Method::POST, "/api/auth/refresh", 401, json!({}));
        let client = client_with_session(&transport);

        let err = client
            .analyze_image(vec![1], "a.png")
            .await
            .expect_err("auth failure must propagate");

        assert_eq!(err, ApiError::SessionExpired);
    }

    #[tokio::test]
    async fn test_retry_after_refresh_reaches_analysis() {
        let transport = Arc::new(FakeTransport::new());
        transport
            .respond(Method::POST, ANALYZE_PATH, 401, json!({}))
            .respond(Method::POST, ANALYZE_PATH, 200, result_body())
            .respond(
                Method::POST,
                "/api/auth/refresh",
                200,
                token_body("renewed", "r2", 3600),
            );
        let client = client_with_session(&transport);

        let result = client
            .analyze_image(vec![1], "a.png")
            .await
            .expect("retry should succeed");

        assert_eq!(result.gemini_analysis.verdict, Verdict::Real);
        assert_eq!(transport.count(&Method::POST, ANALYZE_PATH), 2);
    }

    #[test]
    fn test_mime_guessing() {
        assert_eq!(mime_for("x.png"), "image/png");
        assert_eq!(mime_for("x.JPG"), "image/jpeg");
        assert_eq!(mime_for("dir/x.jpeg"), "image/jpeg");
        assert_eq!(mime_for("x.webp"), "image/webp");
        assert_eq!(mime_for("x.gif"), "image/gif");
        assert_eq!(mime_for("x.tiff"), "application/octet-stream");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }
}
