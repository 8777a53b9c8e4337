//! Policy mapping from classifier verdicts to enforcement decisions.
//!
//! Two pure operations:
//!
//! 1. `should_evaluate` - the synchronous pre-filter that lets trivial
//!    messages skip classification entirely
//! 2. `map_verdict` - turns a verdict into the canonical [`Decision`]
//!    through a fixed violation table
//!
//! Nothing here performs I/O or holds mutable state, which keeps the whole
//! policy surface trivially testable.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::classifier::{Verdict, ViolationType};
use crate::locks::LockRecord;

/// Command prefix that exempts a message from classification.
const COMMAND_PREFIX: char = '/';

/// Minimum trimmed length worth classifying.
const MIN_TEXT_CHARS: usize = 3;

/// Minimum length after stripping non-word characters.
const MIN_WORD_CHARS: usize = 2;

/// Severity attached to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// No violation.
    #[default]
    None,
    /// Serious violation; temporary lock.
    High,
    /// Gravest violation class; week-long lock.
    Critical,
}

impl Severity {
    /// Returns a human-readable name for this severity.
    pub fn name(&self) -> &'static str {
        match self {
            Severity::None => "None",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

/// One row of the fixed violation policy.
struct PolicyEntry {
    violation: ViolationType,
    duration_hours: f64,
    severity: Severity,
    description: &'static str,
}

/// What each confirmed violation type earns. The table is the single
/// source of truth for durations; classifier suggestions never override it.
const POLICY_TABLE: &[PolicyEntry] = &[
    PolicyEntry {
        violation: ViolationType::SexualContent,
        duration_hours: 48.0,
        severity: Severity::High,
        description: "Sexually explicit content",
    },
    PolicyEntry {
        violation: ViolationType::PredatoryBehavior,
        duration_hours: 168.0,
        severity: Severity::Critical,
        description: "Predatory behavior",
    },
];

/// The allow/deny outcome for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the message may be delivered.
    pub allowed: bool,
    /// Violation category behind a deny.
    pub violation_type: ViolationType,
    /// Why this decision was made.
    pub reason: String,
    /// Lock duration a deny carries, in hours.
    pub lock_duration_hours: f64,
    /// Severity of the violation.
    pub severity: Severity,
    /// Classifier confidence behind the decision (0-100).
    pub confidence: u8,
    /// Lock created for (or already held by) the subject on deny.
    pub lock: Option<LockRecord>,
}

impl Decision {
    /// Creates an allowing decision.
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            violation_type: ViolationType::None,
            reason: reason.into(),
            lock_duration_hours: 0.0,
            severity: Severity::None,
            confidence: 0,
            lock: None,
        }
    }

    /// Creates a denying decision for a confirmed violation.
    pub fn deny(
        violation_type: ViolationType,
        reason: impl Into<String>,
        lock_duration_hours: f64,
        severity: Severity,
        confidence: u8,
    ) -> Self {
        Self {
            allowed: false,
            violation_type,
            reason: reason.into(),
            lock_duration_hours,
            severity,
            confidence,
            lock: None,
        }
    }

    /// Creates the deny returned when the subject already holds a lock.
    pub fn locked(lock: Option<LockRecord>) -> Self {
        Self {
            allowed: false,
            violation_type: ViolationType::None,
            reason: "account locked".to_string(),
            lock_duration_hours: 0.0,
            severity: Severity::None,
            confidence: 0,
            lock,
        }
    }

    /// Attaches the lock record created for this decision.
    pub fn with_lock(mut self, lock: LockRecord) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Returns true if the message must not be delivered.
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }
}

/// Pre-filter and verdict mapping.
///
/// Holds one compiled regex; otherwise stateless. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PolicyMapper {
    symbol_filter: Regex,
}

impl PolicyMapper {
    /// Creates a mapper with the standard pre-filter rules.
    pub fn new() -> Self {
        Self {
            symbol_filter: Regex::new(r"[^\w\s]").expect("Invalid regex pattern"),
        }
    }

    /// Returns false when the text should skip classification entirely:
    /// too short, a chat command, or symbols/emoji with no real words.
    pub fn should_evaluate(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.chars().count() < MIN_TEXT_CHARS {
            return false;
        }
        if trimmed.starts_with(COMMAND_PREFIX) {
            return false;
        }
        let word_chars = self.symbol_filter.replace_all(trimmed, "");
        if word_chars.trim().chars().count() < MIN_WORD_CHARS {
            return false;
        }
        true
    }

    /// Maps a verdict onto the fixed policy table.
    ///
    /// A malformed verdict (unrecognized violation type, out-of-range
    /// confidence) yields an allowing decision rather than a guess; the
    /// table's duration and severity always win over classifier
    /// suggestions.
    pub fn map_verdict(&self, verdict: &Verdict) -> Decision {
        if !verdict.violation_type.is_known() || verdict.confidence > 100 {
            return Decision::allow("invalid classifier output");
        }

        if !verdict.is_violation || verdict.violation_type == ViolationType::None {
            return Decision::allow("approved");
        }

        match POLICY_TABLE
            .iter()
            .find(|entry| entry.violation == verdict.violation_type)
        {
            Some(entry) => {
                let reason = if verdict.reason.trim().is_empty() {
                    entry.description.to_string()
                } else {
                    verdict.reason.clone()
                };
                Decision::deny(
                    verdict.violation_type,
                    reason,
                    entry.duration_hours,
                    entry.severity,
                    verdict.confidence,
                )
            }
            None => Decision::allow("invalid classifier output"),
        }
    }
}

impl Default for PolicyMapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(violation_type: ViolationType, confidence: u8, reason: &str) -> Verdict {
        Verdict {
            is_violation: violation_type != ViolationType::None,
            violation_type,
            confidence,
            reason: reason.to_string(),
            suggested_duration_hours: None,
        }
    }

    // ==================== Pre-filter Tests ====================

    #[test]
    fn short_text_is_skipped() {
        let mapper = PolicyMapper::new();
        assert!(!mapper.should_evaluate(""));
        assert!(!mapper.should_evaluate("hi"));
        assert!(!mapper.should_evaluate("  ab  "));
    }

    #[test]
    fn commands_are_skipped() {
        let mapper = PolicyMapper::new();
        assert!(!mapper.should_evaluate("/kick bob"));
        assert!(!mapper.should_evaluate("  /mute alice 5m"));
    }

    #[test]
    fn symbol_only_text_is_skipped() {
        let mapper = PolicyMapper::new();
        assert!(!mapper.should_evaluate(":-) !!"));
        assert!(!mapper.should_evaluate("???"));
        assert!(!mapper.should_evaluate("\u{1F600}\u{1F600}\u{1F600}"));
    }

    #[test]
    fn ordinary_messages_are_evaluated() {
        let mapper = PolicyMapper::new();
        assert!(mapper.should_evaluate("hello there"));
        assert!(mapper.should_evaluate("ok!"));
        assert!(mapper.should_evaluate("what's up?"));
    }

    // ==================== Verdict Mapping Tests ====================

    #[test]
    fn clean_verdict_maps_to_allow() {
        let mapper = PolicyMapper::new();
        let decision = mapper.map_verdict(&verdict(ViolationType::None, 5, ""));
        assert!(decision.allowed);
        assert_eq!(decision.reason, "approved");
        assert_eq!(decision.severity, Severity::None);
    }

    #[test]
    fn sexual_content_always_maps_to_table_row() {
        let mapper = PolicyMapper::new();

        // The reason text must not influence the mapped duration/severity.
        for reason in ["", "explicit", "anything else at all"] {
            let decision = mapper.map_verdict(&verdict(ViolationType::SexualContent, 77, reason));
            assert!(decision.is_denied());
            assert_eq!(decision.lock_duration_hours, 48.0);
            assert_eq!(decision.severity, Severity::High);
            assert_eq!(decision.confidence, 77);
        }
    }

    #[test]
    fn predatory_behavior_maps_to_critical_week_lock() {
        let mapper = PolicyMapper::new();
        let decision = mapper.map_verdict(&verdict(ViolationType::PredatoryBehavior, 92, "grooming"));
        assert!(decision.is_denied());
        assert_eq!(decision.lock_duration_hours, 168.0);
        assert_eq!(decision.severity, Severity::Critical);
        assert_eq!(decision.reason, "grooming");
    }

    #[test]
    fn empty_reason_falls_back_to_table_description() {
        let mapper = PolicyMapper::new();
        let decision = mapper.map_verdict(&verdict(ViolationType::SexualContent, 60, "  "));
        assert_eq!(decision.reason, "Sexually explicit content");
    }

    #[test]
    fn unknown_violation_type_is_rejected() {
        let mapper = PolicyMapper::new();
        let decision = mapper.map_verdict(&verdict(ViolationType::Unknown, 90, "???"));
        assert!(decision.allowed);
        assert_eq!(decision.reason, "invalid classifier output");
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let mapper = PolicyMapper::new();
        let mut bad = verdict(ViolationType::SexualContent, 0, "x");
        bad.confidence = 180;
        let decision = mapper.map_verdict(&bad);
        assert!(decision.allowed);
        assert_eq!(decision.reason, "invalid classifier output");
    }

    #[test]
    fn suggested_duration_never_overrides_the_table() {
        let mapper = PolicyMapper::new();
        let mut flagged = verdict(ViolationType::SexualContent, 80, "x");
        flagged.suggested_duration_hours = Some(2.0);
        let decision = mapper.map_verdict(&flagged);
        assert_eq!(decision.lock_duration_hours, 48.0);
    }

    #[test]
    fn violation_flag_without_type_allows() {
        let mapper = PolicyMapper::new();
        let mut odd = verdict(ViolationType::None, 95, "flagged but typed none");
        odd.is_violation = true;
        let decision = mapper.map_verdict(&odd);
        assert!(decision.allowed);
    }

    // ==================== Decision Tests ====================

    #[test]
    fn decision_constructors() {
        let allow = Decision::allow("skipped");
        assert!(allow.allowed);
        assert!(!allow.is_denied());

        let deny = Decision::deny(
            ViolationType::SexualContent,
            "explicit",
            48.0,
            Severity::High,
            70,
        );
        assert!(deny.is_denied());
        assert!(deny.lock.is_none());

        let locked = Decision::locked(None);
        assert!(locked.is_denied());
        assert_eq!(locked.reason, "account locked");
    }

    #[test]
    fn decision_serialization_round_trip() {
        let decision = Decision::deny(
            ViolationType::PredatoryBehavior,
            "grooming",
            168.0,
            Severity::Critical,
            92,
        );
        let json = serde_json::to_string(&decision).unwrap();
        let deserialized: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(decision, deserialized);
    }
}
