//! Human-readable rendering of snapshots and analysis results.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use forense_core::auth::CredentialSet;
use forense_core::models::AnalysisResult;
use forense_core::UsageSnapshot;

/// Characters of a key left visible on each side when masked
const KEY_VISIBLE_CHARS: usize = 4;

pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= KEY_VISIBLE_CHARS * 2 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..KEY_VISIBLE_CHARS].iter().collect();
    let tail: String = chars[chars.len() - KEY_VISIBLE_CHARS..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - KEY_VISIBLE_CHARS * 2), tail)
}

pub fn format_snapshot(snapshot: &UsageSnapshot) -> String {
    if snapshot.is_offline() {
        return format!(
            "Offline: the analysis API is unreachable.\n\
             Analyses will return demonstration results ({} available).",
            snapshot.requests_remaining
        );
    }
    if snapshot.hides_usage() {
        return "Using your own Gemini key - usage is not metered.".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Session:   {} ({})",
        snapshot.session_id.as_deref().unwrap_or("-"),
        snapshot.limit_class.label()
    );
    let _ = writeln!(
        out,
        "Requests:  {} used, {} remaining ({}% used)",
        snapshot.requests_used,
        snapshot.requests_remaining,
        snapshot.requests_used_percent()
    );
    let _ = write!(
        out,
        "Quota:     {} used, {} remaining",
        snapshot.quota_used, snapshot.quota_remaining
    );
    if snapshot.session_age_hours > 0.0 {
        let _ = write!(out, "\nAge:       {:.1} h", snapshot.session_age_hours);
    }
    out
}

pub fn format_token_expiry(credentials: &CredentialSet, now: DateTime<Utc>) -> String {
    if credentials.is_valid_at(now) {
        format!("Token:     expires in {} min", credentials.minutes_left_at(now))
    } else {
        "Token:     expired, renewed on next request".to_string()
    }
}

pub fn format_result(file: &str, result: &AnalysisResult) -> String {
    let automated = &result.automated_analysis;
    let gemini = &result.gemini_analysis;

    let mut out = String::new();
    if result.demo {
        let _ = writeln!(out, "{} [DEMO - API unreachable]", file);
    } else {
        let _ = writeln!(out, "{}", file);
    }
    let _ = writeln!(
        out,
        "  Verdict:   {} ({} confidence)",
        gemini.verdict.label(),
        gemini.confidence.label().to_lowercase()
    );
    let _ = writeln!(
        out,
        "  Score:     {}% - {} ({} confidence)",
        automated.score_percent(),
        automated.interpretation,
        automated.confidence.label().to_lowercase()
    );

    let evidence = automated.evidence();
    if !evidence.is_empty() {
        let _ = writeln!(out, "  Evidence:");
        for (source, message) in evidence {
            let _ = writeln!(out, "    [{}] {}", source, message);
        }
    }
    if !gemini.explanation.is_empty() {
        let _ = writeln!(out, "  Explanation: {}", gemini.explanation);
    }
    if !automated.recommendation.is_empty() {
        let _ = writeln!(out, "  Recommendation: {}", automated.recommendation);
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("AIzaSyD-1234567890"), "AIza**********7890");
        assert_eq!(mask_key("short"), "*****");
        assert_eq!(mask_key(""), "");
    }

    #[test]
    fn test_format_offline_and_custom_snapshots() {
        assert!(format_snapshot(&UsageSnapshot::offline()).starts_with("Offline"));

        let custom = format_snapshot(&UsageSnapshot::custom_key());
        assert!(custom.contains("own Gemini key"));
        assert!(!custom.contains("9999"));
    }

    #[test]
    fn test_format_live_snapshot() {
        let mut snapshot = UsageSnapshot::offline();
        snapshot.limit_class = forense_core::auth::LimitClass::AnonymousDefault;
        snapshot.session_id = Some("abc".to_string());
        snapshot.requests_used = 10;
        snapshot.requests_remaining = 40;

        let text = format_snapshot(&snapshot);
        assert!(text.contains("Session:   abc (Anonymous)"));
        assert!(text.contains("10 used, 40 remaining (20% used)"));
    }

    #[test]
    fn test_format_token_expiry() {
        let issued = Utc::now();
        let creds = CredentialSet {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_in: 900,
            issued_at: issued,
        };
        assert_eq!(
            format_token_expiry(&creds, issued),
            "Token:     expires in 15 min"
        );
        assert!(format_token_expiry(&creds, issued + chrono::Duration::hours(1)).contains("expired"));
    }

    #[test]
    fn test_format_demo_result() {
        let text = format_result("photo.png", &AnalysisResult::demo());
        assert!(text.starts_with("photo.png [DEMO"));
        assert!(text.contains("AI-generated"));
        assert!(text.contains("82%"));
        assert!(text.contains("Recommendation:"));
    }
}
