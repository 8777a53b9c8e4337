//! Verdict types returned by the classification endpoint.

use serde::{Deserialize, Serialize};

/// Violation categories the classification endpoint can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    /// Sexually explicit content.
    SexualContent,
    /// Grooming or predatory behavior.
    PredatoryBehavior,
    /// No violation.
    #[default]
    None,
    /// Label the endpoint sent that this build does not recognize.
    /// Survives parsing so the policy mapper can reject it explicitly.
    #[serde(other)]
    Unknown,
}

impl ViolationType {
    /// Returns the violation type as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SexualContent => "sexual_content",
            Self::PredatoryBehavior => "predatory_behavior",
            Self::None => "none",
            Self::Unknown => "unknown",
        }
    }

    /// Returns the types the endpoint contract defines.
    pub fn all() -> &'static [ViolationType] {
        &[Self::SexualContent, Self::PredatoryBehavior, Self::None]
    }

    /// Returns true for a type the policy table can act on.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for ViolationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parsed classification verdict. Produced per call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the endpoint flagged the message.
    pub is_violation: bool,
    /// Reported violation category.
    pub violation_type: ViolationType,
    /// Confidence score (0-100).
    pub confidence: u8,
    /// Free-form explanation from the endpoint.
    pub reason: String,
    /// Lock duration the endpoint suggested. Advisory only; the policy
    /// table decides the actual duration.
    pub suggested_duration_hours: Option<f64>,
}

/// Loosely-typed wire shape used to validate the endpoint response.
#[derive(Debug, Deserialize)]
struct WireVerdict {
    is_violation: Option<bool>,
    violation_type: Option<ViolationType>,
    confidence: Option<f64>,
    reason: Option<String>,
    suggested_duration_hours: Option<f64>,
}

impl Verdict {
    /// A clean verdict for messages that never reached the endpoint.
    pub fn clean() -> Self {
        Self {
            is_violation: false,
            violation_type: ViolationType::None,
            confidence: 0,
            reason: String::new(),
            suggested_duration_hours: None,
        }
    }

    /// The fail-open verdict used when the endpoint response is unusable.
    pub fn invalid_response() -> Self {
        Self {
            reason: "invalid response".to_string(),
            ..Self::clean()
        }
    }

    /// Parses a raw endpoint response body.
    ///
    /// Returns `None` when required fields are missing or the wrong type;
    /// the caller resolves that to [`Verdict::invalid_response`].
    pub fn from_wire(body: serde_json::Value) -> Option<Self> {
        let wire: WireVerdict = serde_json::from_value(body).ok()?;

        let is_violation = wire.is_violation?;
        let violation_type = wire.violation_type?;
        let confidence = wire.confidence?;
        if !confidence.is_finite() {
            return None;
        }

        Some(Self {
            is_violation,
            violation_type,
            confidence: confidence.round().clamp(0.0, 100.0) as u8,
            reason: wire.reason.unwrap_or_default(),
            suggested_duration_hours: wire.suggested_duration_hours,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ==================== ViolationType Tests ====================

    #[test]
    fn violation_type_as_str() {
        assert_eq!(ViolationType::SexualContent.as_str(), "sexual_content");
        assert_eq!(ViolationType::PredatoryBehavior.as_str(), "predatory_behavior");
        assert_eq!(ViolationType::None.as_str(), "none");
    }

    #[test]
    fn violation_type_all_excludes_unknown() {
        let all = ViolationType::all();
        assert_eq!(all.len(), 3);
        assert!(!all.contains(&ViolationType::Unknown));
    }

    #[test]
    fn violation_type_deserializes_known_labels() {
        let vt: ViolationType = serde_json::from_str("\"sexual_content\"").unwrap();
        assert_eq!(vt, ViolationType::SexualContent);

        let vt: ViolationType = serde_json::from_str("\"predatory_behavior\"").unwrap();
        assert_eq!(vt, ViolationType::PredatoryBehavior);
    }

    #[test]
    fn violation_type_unrecognized_label_becomes_unknown() {
        let vt: ViolationType = serde_json::from_str("\"spam\"").unwrap();
        assert_eq!(vt, ViolationType::Unknown);
        assert!(!vt.is_known());
    }

    // ==================== Verdict Parsing Tests ====================

    #[test]
    fn parse_complete_verdict() {
        let body = json!({
            "is_violation": true,
            "violation_type": "predatory_behavior",
            "confidence": 92,
            "reason": "grooming patterns",
            "suggested_duration_hours": 72.0
        });

        let verdict = Verdict::from_wire(body).unwrap();
        assert!(verdict.is_violation);
        assert_eq!(verdict.violation_type, ViolationType::PredatoryBehavior);
        assert_eq!(verdict.confidence, 92);
        assert_eq!(verdict.reason, "grooming patterns");
        assert_eq!(verdict.suggested_duration_hours, Some(72.0));
    }

    #[test]
    fn parse_tolerates_missing_optional_fields() {
        let body = json!({
            "is_violation": false,
            "violation_type": "none",
            "confidence": 3
        });

        let verdict = Verdict::from_wire(body).unwrap();
        assert!(!verdict.is_violation);
        assert_eq!(verdict.reason, "");
        assert!(verdict.suggested_duration_hours.is_none());
    }

    #[test]
    fn parse_rejects_missing_required_fields() {
        assert!(Verdict::from_wire(json!({"is_violation": true})).is_none());
        assert!(Verdict::from_wire(json!({"violation_type": "none", "confidence": 1})).is_none());
        assert!(Verdict::from_wire(json!({"is_violation": true, "violation_type": "none"})).is_none());
    }

    #[test]
    fn parse_rejects_non_object_body() {
        assert!(Verdict::from_wire(json!("not an object")).is_none());
        assert!(Verdict::from_wire(json!([1, 2, 3])).is_none());
    }

    #[test]
    fn parse_rejects_mistyped_fields() {
        let body = json!({
            "is_violation": "yes",
            "violation_type": "none",
            "confidence": 50
        });
        assert!(Verdict::from_wire(body).is_none());

        let body = json!({
            "is_violation": true,
            "violation_type": 7,
            "confidence": 50
        });
        assert!(Verdict::from_wire(body).is_none());
    }

    #[test]
    fn parse_clamps_confidence_into_range() {
        let body = json!({
            "is_violation": true,
            "violation_type": "sexual_content",
            "confidence": 250
        });
        assert_eq!(Verdict::from_wire(body).unwrap().confidence, 100);

        let body = json!({
            "is_violation": true,
            "violation_type": "sexual_content",
            "confidence": -5
        });
        assert_eq!(Verdict::from_wire(body).unwrap().confidence, 0);
    }

    #[test]
    fn parse_keeps_unknown_violation_type() {
        let body = json!({
            "is_violation": true,
            "violation_type": "astrology",
            "confidence": 80
        });
        let verdict = Verdict::from_wire(body).unwrap();
        assert_eq!(verdict.violation_type, ViolationType::Unknown);
    }

    #[test]
    fn clean_and_invalid_constructors() {
        let clean = Verdict::clean();
        assert!(!clean.is_violation);
        assert_eq!(clean.violation_type, ViolationType::None);

        let invalid = Verdict::invalid_response();
        assert!(!invalid.is_violation);
        assert_eq!(invalid.reason, "invalid response");
    }
}
