//! Canned analysis shown when the API cannot be reached.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::analysis::{
    AnalysisDetails, AnalysisResult, AutomatedAnalysis, Confidence, GeminiAnalysis,
    IndividualScores, MethodDetail, MethodStatus, Verdict,
};

const PLACEHOLDER_IMAGE: &str = "https://picsum.photos/800/600";
const PLACEHOLDER_NOISE: &str = "https://picsum.photos/800/600?grayscale&blur=2";
const PLACEHOLDER_ELA: &str = "https://picsum.photos/800/600?contrast=2";
const PLACEHOLDER_FFT: &str = "https://picsum.photos/800/600?invert=1";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn metrics(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

impl AnalysisResult {
    /// Fixed demonstration verdict for an AI-generated portrait.
    pub fn demo() -> Self {
        Self {
            automated_analysis: AutomatedAnalysis {
                final_score: 0.82,
                interpretation: "Highly likely AI".to_string(),
                confidence: Confidence::High,
                methods_used: strings(&["FFT", "NOISE", "ELA"]),
                individual_scores: IndividualScores {
                    fft: 0.88,
                    noise: 0.82,
                    ela: 0.24,
                },
                key_evidence: strings(&[
                    "NOISE: Synthetic noise detected (consistency=0.85)",
                    "FFT: Near-perfect spectral symmetry - highly artificial",
                    "NOISE: Noise pattern with moderate-high consistency",
                    "ELA: No significant anomaly detected (common false negative for high-end models)",
                ]),
                recommendation: "MANUAL REVIEW - Strong signs of synthetic generation".to_string(),
            },
            gemini_analysis: GeminiAnalysis {
                verdict: Verdict::Ai,
                full_analysis: "**VERDICT**: AI-GENERATED\n\n**CONFIDENCE**: HIGH\n\n**EXPLANATION**..."
                    .to_string(),
                explanation: "Although this image may look convincing to the naked eye, the \
                    forensic analysis found fingerprints that do not occur in the real world. \
                    The image texture is too consistent and mathematically perfect."
                    .to_string(),
                confidence: Confidence::High,
                key_indicators: strings(&[
                    "Uniform noise pattern typical of generators",
                    "No natural JPEG compression artifacts",
                    "Perfect symmetry in the frequency spectrum",
                ]),
            },
            annotated_image: PLACEHOLDER_IMAGE.to_string(),
            details: AnalysisDetails {
                fft: MethodDetail {
                    method: "FFT".to_string(),
                    status: MethodStatus::Success,
                    image_base64: Some(PLACEHOLDER_FFT.to_string()),
                    risk_score: 0.88,
                    metrics: metrics(&[
                        ("spectral_uniformity", json!(1.0)),
                        ("peak_frequency_count", json!(0)),
                        ("symmetry_score", json!(0.9999)),
                        ("grid_artifacts", json!(false)),
                        ("dominant_frequency", json!([-30, 0])),
                        ("high_frequency_energy_ratio", json!(0.5736)),
                    ]),
                    warnings: strings(&[
                        "Near-perfect spectral symmetry - highly artificial",
                        "Overly uniform spectrum - lacks organic complexity",
                    ]),
                },
                noise: MethodDetail {
                    method: "NOISE".to_string(),
                    status: MethodStatus::Success,
                    image_base64: Some(PLACEHOLDER_NOISE.to_string()),
                    risk_score: 0.82,
                    metrics: metrics(&[
                        ("mean_noise_level", json!(0.3716)),
                        ("noise_consistency", json!(0.65)),
                        ("regions_with_low_noise", json!(["skin"])),
                        ("expected_noise_for_iso", json!(0.135)),
                        ("iso_confidence", json!("medium-high")),
                    ]),
                    warnings: strings(&[
                        "Noise pattern with moderate-high consistency",
                        "Abnormally smooth skin texture",
                        "Synthetic noise detected - typical of AI adding fake grain",
                    ]),
                },
                ela: MethodDetail {
                    method: "ELA".to_string(),
                    status: MethodStatus::Success,
                    image_base64: Some(PLACEHOLDER_ELA.to_string()),
                    risk_score: 0.24,
                    metrics: metrics(&[
                        ("mean_error_level", json!(0.1836)),
                        ("bright_pixels_percentage", json!(16.35)),
                        ("error_kurtosis", json!(4.09)),
                        ("suspicious_low_error_percentage", json!(6.46)),
                    ]),
                    warnings: strings(&["No significant anomaly detected"]),
                },
            },
            demo: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_result_is_stable() {
        let demo = AnalysisResult::demo();
        assert_eq!(demo, AnalysisResult::demo());
        assert_eq!(demo.gemini_analysis.verdict, Verdict::Ai);
        assert_eq!(demo.automated_analysis.score_percent(), 82);
        assert_eq!(demo.annotated_image, PLACEHOLDER_IMAGE);
        assert!(demo.demo);
    }
}
