use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Safety margin before expiry after which a token is no longer used.
/// Guards against a token expiring while a request is in flight.
const VALIDITY_MARGIN_SECS: i64 = 10;

/// Seconds-to-live assumed when the server reports none
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Upper bound on a reported seconds-to-live (one year)
const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 3600;

/// Bearer credentials for the current session.
///
/// Only the server-reported seconds-to-live and the local issuance instant
/// are persisted; the absolute expiry is always derived from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    pub expires_in: i64,
    pub issued_at: DateTime<Utc>,
}

impl CredentialSet {
    pub fn issue(payload: TokenPayload, now: DateTime<Utc>) -> Self {
        let expires_in = payload.expires_in();
        Self {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token.unwrap_or_default(),
            expires_in,
            issued_at: now,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + Duration::seconds(self.expires_in.clamp(0, MAX_EXPIRES_IN_SECS))
    }

    /// Valid iff an access token is present and `now` is strictly before
    /// the expiry minus the safety margin.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty()
            && now < self.expires_at() - Duration::seconds(VALIDITY_MARGIN_SECS)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Whole minutes left on the access token, zero once it has lapsed
    pub fn minutes_left_at(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at() - now).num_minutes().max(0)
    }
}

/// Token fields of an `/api/auth/anonymous` or `/api/auth/refresh` response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPayload {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub access_expires_in: Option<i64>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenPayload {
    /// Seconds-to-live: `access_expires_in`, then `expires_in`, then the default.
    /// Zero or negative values count as absent.
    pub fn expires_in(&self) -> i64 {
        [self.access_expires_in, self.expires_in]
            .into_iter()
            .flatten()
            .find(|secs| *secs > 0)
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .min(MAX_EXPIRES_IN_SECS)
    }
}
