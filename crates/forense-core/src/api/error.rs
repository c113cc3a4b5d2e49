use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network offline: cannot perform authenticated request")]
    Offline,

    #[error("Authentication failed: could not start a session")]
    AuthUnavailable,

    #[error("Session expired. Please reload and authenticate again")]
    SessionExpired,

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Refresh failed: {0}")]
    RefreshFailed(u16),

    #[error("Session creation failed: {0}")]
    SessionCreation(u16),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Quota exceeded. Try again later or use your own Gemini key")]
    QuotaExceeded,

    #[error("Analysis failed ({status}): {body}")]
    Analysis { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid header value for {0}")]
    InvalidHeader(&'static str),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Map a non-success status from a session endpoint.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            429 => ApiError::RateLimited,
            code => ApiError::InvalidResponse(format!(
                "Status {}: {}",
                code,
                Self::truncate_body(body)
            )),
        }
    }

    /// True when the failure means the API could not be reached at all.
    ///
    /// Business failures (bad status, quota, auth) never count, so callers
    /// can degrade to offline behaviour without masking real errors.
    pub fn is_network_unreachable(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Offline)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited | ApiError::QuotaExceeded)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        // A request that could not be built never left this machine.
        if err.is_builder() {
            ApiError::InvalidRequest(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_mapping() {
        assert_eq!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        );
        assert_eq!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            ApiError::RateLimited
        );
        match ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom") {
            ApiError::InvalidResponse(msg) => assert_eq!(msg, "Status 500: boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_truncate_body_respects_char_boundary() {
        let body = "é".repeat(400);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.contains("truncated, 800 total bytes"));

        assert_eq!(ApiError::truncate_body("short"), "short");
    }

    #[test]
    fn test_network_unreachable_classification() {
        assert!(ApiError::Network("connection refused".into()).is_network_unreachable());
        assert!(ApiError::Offline.is_network_unreachable());

        assert!(!ApiError::QuotaExceeded.is_network_unreachable());
        assert!(!ApiError::SessionExpired.is_network_unreachable());
        assert!(!ApiError::AuthUnavailable.is_network_unreachable());
        assert!(!ApiError::InvalidRequest("relative URL without a base".into())
            .is_network_unreachable());
        assert!(!ApiError::Analysis {
            status: 500,
            body: "network error upstream".into()
        }
        .is_network_unreachable());
    }

    #[test]
    fn test_quota_message_suggests_custom_key() {
        let msg = ApiError::QuotaExceeded.to_string();
        assert!(msg.contains("Gemini key"));
    }
}
