use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

// The server sends `null` for stages it skipped; treat that like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Confidence {
    pub fn label(&self) -> &'static str {
        match self {
            Confidence::VeryHigh => "Very high",
            Confidence::High => "High",
            Confidence::Medium => "Medium",
            Confidence::Low => "Low",
            Confidence::VeryLow => "Very low",
            Confidence::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Verdict {
    #[serde(rename = "REAL")]
    Real,
    #[serde(rename = "IA")]
    Ai,
    #[default]
    #[serde(rename = "INCONCLUSIVO")]
    #[serde(other)]
    Inconclusive,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Real => "Real photograph",
            Verdict::Ai => "AI-generated",
            Verdict::Inconclusive => "Inconclusive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct IndividualScores {
    #[serde(default, deserialize_with = "null_as_default")]
    pub fft: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub noise: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ela: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AutomatedAnalysis {
    #[serde(default, deserialize_with = "null_as_default")]
    pub final_score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub interpretation: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidence: Confidence,
    #[serde(default, deserialize_with = "null_as_default")]
    pub methods_used: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub individual_scores: IndividualScores,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_evidence: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recommendation: String,
}

impl AutomatedAnalysis {
    /// Split evidence lines of the form `SOURCE: message`.
    /// Lines without a source are attributed to `DETECTION`.
    pub fn evidence(&self) -> Vec<(&str, &str)> {
        self.key_evidence
            .iter()
            .map(|line| match line.split_once(':') {
                Some((source, message)) => (source.trim(), message.trim()),
                None => ("DETECTION", line.trim()),
            })
            .collect()
    }

    /// Final score as a whole percentage
    pub fn score_percent(&self) -> u32 {
        (self.final_score.clamp(0.0, 1.0) * 100.0).round() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GeminiAnalysis {
    #[serde(default, deserialize_with = "null_as_default")]
    pub verdict: Verdict,
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_analysis: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub explanation: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidence: Confidence,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_indicators: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MethodStatus {
    #[default]
    Success,
    #[serde(other)]
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MethodDetail {
    #[serde(default, deserialize_with = "null_as_default")]
    pub method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: MethodStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub risk_score: f64,
    /// Method-specific metrics; values are numbers, strings, booleans or lists
    #[serde(default, deserialize_with = "null_as_default")]
    pub metrics: BTreeMap<String, serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisDetails {
    #[serde(default, deserialize_with = "null_as_default")]
    pub fft: MethodDetail,
    #[serde(default, deserialize_with = "null_as_default")]
    pub noise: MethodDetail,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ela: MethodDetail,
}

/// Structured verdict returned by `POST /api/analyze-image`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub automated_analysis: AutomatedAnalysis,
    #[serde(default, deserialize_with = "null_as_default")]
    pub gemini_analysis: GeminiAnalysis,
    /// Base64 PNG, data URI or plain URL
    #[serde(default, deserialize_with = "null_as_default")]
    pub annotated_image: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub details: AnalysisDetails,
    /// Set only on the canned offline result; never sent by the server
    #[serde(skip)]
    pub demo: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analysis_result() {
        let json = r#"{
            "automated_analysis": {
                "final_score": 0.31,
                "interpretation": "Likely real",
                "confidence": "medium",
                "methods_used": ["FFT", "NOISE"],
                "individual_scores": {"fft": 0.2, "noise": 0.4, "ela": 0.1},
                "key_evidence": ["FFT: natural spectrum", "no anomalies"],
                "recommendation": "No action"
            },
            "gemini_analysis": {
                "verdict": "REAL",
                "full_analysis": "...",
                "explanation": "Camera noise present",
                "confidence": "high",
                "key_indicators": ["sensor noise"]
            },
            "annotated_image": "iVBORw0KGgo=",
            "details": {
                "fft": {"method": "FFT", "status": "success", "risk_score": 0.2,
                        "metrics": {"grid_artifacts": false, "dominant_frequency": [-30, 0]},
                        "warnings": []},
                "noise": {"method": "NOISE", "status": "failed", "risk_score": 0.0,
                          "metrics": {}, "warnings": ["too small"]}
            }
        }"#;

        let result: AnalysisResult =
            serde_json::from_str(json).expect("Failed to parse analysis test JSON");
        assert_eq!(result.gemini_analysis.verdict, Verdict::Real);
        assert_eq!(result.automated_analysis.confidence, Confidence::Medium);
        assert_eq!(result.automated_analysis.score_percent(), 31);
        assert_eq!(result.details.noise.status, MethodStatus::Failed);
        assert_eq!(
            result.details.fft.metrics.get("grid_artifacts"),
            Some(&serde_json::Value::Bool(false))
        );
        // ELA omitted by the server
        assert_eq!(result.details.ela, MethodDetail::default());
        assert!(!result.demo);
        assert_eq!(result.annotated_image, "iVBORw0KGgo=");
    }

    #[test]
    fn test_evidence_split() {
        let analysis = AutomatedAnalysis {
            key_evidence: vec![
                "NOISE: synthetic noise (consistency=0.85)".to_string(),
                "plain observation".to_string(),
            ],
            ..Default::default()
        };
        assert_eq!(
            analysis.evidence(),
            vec![
                ("NOISE", "synthetic noise (consistency=0.85)"),
                ("DETECTION", "plain observation"),
            ]
        );
    }

    #[test]
    fn test_null_sections_fall_back_to_defaults() {
        let json = r#"{
            "automated_analysis": {
                "final_score": 0.7,
                "interpretation": null,
                "confidence": null,
                "key_evidence": null
            },
            "gemini_analysis": null,
            "annotated_image": null,
            "details": {
                "fft": {"method": "FFT", "status": "skipped", "risk_score": null, "metrics": null},
                "noise": null
            }
        }"#;

        let result: AnalysisResult =
            serde_json::from_str(json).expect("null sections should not fail");
        assert_eq!(result.automated_analysis.score_percent(), 70);
        assert_eq!(result.automated_analysis.confidence, Confidence::Unknown);
        assert!(result.automated_analysis.key_evidence.is_empty());
        assert_eq!(result.gemini_analysis, GeminiAnalysis::default());
        assert_eq!(result.gemini_analysis.verdict, Verdict::Inconclusive);
        assert_eq!(result.details.fft.status, MethodStatus::Failed);
        assert_eq!(result.details.fft.risk_score, 0.0);
        assert!(result.details.fft.metrics.is_empty());
        assert_eq!(result.details.noise, MethodDetail::default());
    }

    #[test]
    fn test_unknown_enum_values_fall_back() {
        let gemini: GeminiAnalysis =
            serde_json::from_str(r#"{"verdict": "MAYBE", "confidence": "extreme"}"#)
                .expect("unknown values should not fail");
        assert_eq!(gemini.verdict, Verdict::Inconclusive);
        assert_eq!(gemini.confidence, Confidence::Unknown);
    }
}
