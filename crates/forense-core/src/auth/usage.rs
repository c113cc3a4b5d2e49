//! Usage snapshots and the decoding of server usage payloads.
//!
//! The API has reported usage in three shapes over time. They are decoded
//! in a fixed order, first match wins:
//!
//! 1. `Flat`: counters at the top level
//! 2. `Nested`: counters inside a `stats` object
//! 3. `Legacy`: only `limits.current_usage`, remaining derived from ceilings

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel counter shown for custom-key sessions, where usage is hidden
const CUSTOM_KEY_SENTINEL: u64 = 9999;

const CUSTOM_KEY_SESSION_ID: &str = "custom-key-session";

/// Requests advertised while offline
const OFFLINE_REQUESTS_REMAINING: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum LimitClass {
    ServerKey,
    CustomKey,
    OfflineDemo,
    #[default]
    #[serde(other)]
    AnonymousDefault,
}

impl LimitClass {
    pub fn label(&self) -> &'static str {
        match self {
            LimitClass::AnonymousDefault => "Anonymous",
            LimitClass::ServerKey => "Server key",
            LimitClass::CustomKey => "Custom key",
            LimitClass::OfflineDemo => "Offline (demo)",
        }
    }
}

/// Point-in-time view of request and quota consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UsageSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub requests_used: u64,
    pub requests_remaining: u64,
    pub quota_used: u64,
    pub quota_remaining: u64,
    #[serde(rename = "limit_type")]
    pub limit_class: LimitClass,
    #[serde(default)]
    pub session_age_hours: f64,
}

impl UsageSnapshot {
    /// Synthetic snapshot for sessions using a caller-supplied key.
    pub fn custom_key() -> Self {
        Self {
            session_id: Some(CUSTOM_KEY_SESSION_ID.to_string()),
            requests_used: 0,
            requests_remaining: CUSTOM_KEY_SENTINEL,
            quota_used: 0,
            quota_remaining: CUSTOM_KEY_SENTINEL,
            limit_class: LimitClass::CustomKey,
            session_age_hours: 0.0,
        }
    }

    /// Synthetic snapshot used while the API is unreachable or rate limiting.
    pub fn offline() -> Self {
        Self {
            session_id: None,
            requests_used: 0,
            requests_remaining: OFFLINE_REQUESTS_REMAINING,
            quota_used: 0,
            quota_remaining: 0,
            limit_class: LimitClass::OfflineDemo,
            session_age_hours: 0.0,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.limit_class == LimitClass::OfflineDemo
    }

    /// Counters are sentinels and must not be shown
    pub fn hides_usage(&self) -> bool {
        self.limit_class == LimitClass::CustomKey
    }

    /// Share of the request allowance already consumed, 0-100
    pub fn requests_used_percent(&self) -> u8 {
        let total = self.requests_used + self.requests_remaining;
        if total == 0 {
            return 100;
        }
        ((self.requests_used.min(total) * 100) / total) as u8
    }
}

/// Ceilings used to derive remaining counts from legacy payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageLimits {
    pub max_requests: u64,
    pub max_quota: u64,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            max_requests: 50,
            max_quota: 5000,
        }
    }
}

// Counters are taken as reported: null or missing is 0, fractions are
// truncated and negatives clamp to 0.
fn deserialize_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct CountVisitor;

    impl<'de> de::Visitor<'de> for CountVisitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number or null")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v.max(0) as u64)
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            if v.is_finite() && v > 0.0 {
                Ok(v as u64)
            } else {
                Ok(0)
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            match v.trim().parse::<f64>() {
                Ok(n) => self.visit_f64(n),
                Err(_) => Ok(0),
            }
        }

        fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
            Ok(0)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(0)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(0)
        }
    }

    deserializer.deserialize_any(CountVisitor)
}

fn deserialize_session_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn deserialize_limit_type<'de, D>(deserializer: D) -> Result<Option<LimitClass>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn deserialize_hours<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_f64())
}

#[derive(Debug, Deserialize)]
pub(crate) struct FlatUsage {
    #[serde(default, deserialize_with = "deserialize_session_id")]
    session_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_count")]
    requests_used: u64,
    #[serde(default, deserialize_with = "deserialize_count")]
    requests_remaining: u64,
    #[serde(default, deserialize_with = "deserialize_count")]
    quota_used: u64,
    #[serde(default, deserialize_with = "deserialize_count")]
    quota_remaining: u64,
    #[serde(default, deserialize_with = "deserialize_limit_type")]
    limit_type: Option<LimitClass>,
    #[serde(default, deserialize_with = "deserialize_hours")]
    session_age_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UsageCounters {
    #[serde(default, deserialize_with = "deserialize_count")]
    requests_used: u64,
    #[serde(default, deserialize_with = "deserialize_count")]
    requests_remaining: u64,
    #[serde(default, deserialize_with = "deserialize_count")]
    quota_used: u64,
    #[serde(default, deserialize_with = "deserialize_count")]
    quota_remaining: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NestedUsage {
    #[serde(default, deserialize_with = "deserialize_session_id")]
    session_id: Option<String>,
    stats: UsageCounters,
    #[serde(default, deserialize_with = "deserialize_limit_type")]
    limit_type: Option<LimitClass>,
    #[serde(default, deserialize_with = "deserialize_hours")]
    session_age_hours: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LegacyCounters {
    #[serde(default, deserialize_with = "deserialize_count")]
    requests_used: u64,
    #[serde(default, deserialize_with = "deserialize_count")]
    quota_used: u64,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LegacyLimits {
    #[serde(default)]
    current_usage: Option<LegacyCounters>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LegacyUsage {
    #[serde(default, deserialize_with = "deserialize_session_id")]
    session_id: Option<String>,
    #[serde(default)]
    limits: Option<LegacyLimits>,
}

#[derive(Debug)]
pub(crate) enum UsagePayload {
    Flat(FlatUsage),
    Nested(NestedUsage),
    Legacy(LegacyUsage),
}

impl UsagePayload {
    /// The shape is chosen by where a numeric `requests_remaining` sits;
    /// the remaining fields are then read leniently.
    pub fn decode(value: &Value) -> Self {
        if value.get("requests_remaining").is_some_and(Value::is_number) {
            if let Ok(flat) = FlatUsage::deserialize(value) {
                return UsagePayload::Flat(flat);
            }
        }
        let nested_remaining = value
            .get("stats")
            .and_then(|stats| stats.get("requests_remaining"));
        if nested_remaining.is_some_and(Value::is_number) {
            if let Ok(nested) = NestedUsage::deserialize(value) {
                return UsagePayload::Nested(nested);
            }
        }
        UsagePayload::Legacy(LegacyUsage::deserialize(value).unwrap_or_default())
    }

    /// Map to a snapshot. A locally active custom key always wins over the
    /// limit class the server declares.
    pub fn into_snapshot(self, limits: &UsageLimits, custom_key_active: bool) -> UsageSnapshot {
        let mut snapshot = match self {
            UsagePayload::Flat(flat) => UsageSnapshot {
                session_id: flat.session_id,
                requests_used: flat.requests_used,
                requests_remaining: flat.requests_remaining,
                quota_used: flat.quota_used,
                quota_remaining: flat.quota_remaining,
                limit_class: flat.limit_type.unwrap_or_default(),
                session_age_hours: flat.session_age_hours.unwrap_or(0.0),
            },
            UsagePayload::Nested(nested) => UsageSnapshot {
                session_id: nested.session_id,
                requests_used: nested.stats.requests_used,
                requests_remaining: nested.stats.requests_remaining,
                quota_used: nested.stats.quota_used,
                quota_remaining: nested.stats.quota_remaining,
                limit_class: nested.limit_type.unwrap_or_default(),
                session_age_hours: nested.session_age_hours.unwrap_or(0.0),
            },
            UsagePayload::Legacy(legacy) => {
                let usage = legacy
                    .limits
                    .and_then(|l| l.current_usage)
                    .unwrap_or_default();
                UsageSnapshot {
                    session_id: legacy.session_id,
                    requests_used: usage.requests_used,
                    requests_remaining: limits.max_requests.saturating_sub(usage.requests_used),
                    quota_used: usage.quota_used,
                    quota_remaining: limits.max_quota.saturating_sub(usage.quota_used),
                    limit_class: LimitClass::AnonymousDefault,
                    session_age_hours: 0.0,
                }
            }
        };

        if custom_key_active {
            snapshot.limit_class = LimitClass::CustomKey;
        }
        snapshot
    }
}
