//! Error Classifier - severity and healability judgments
//!
//! Severity is a keyword scan over the error type and message. Healability
//! additionally requires the error to match one of the known-healable
//! categories and the signature's past attempts to have gone well enough.

use crate::healing::types::{success_rate, ErrorEvent, HealingAttempt, Severity};
use regex::Regex;
use std::fmt;

/// Families of failures the pipeline knows how to remediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealableCategory {
    ConnectionFailure,
    Timeout,
    RateLimit,
    AuthenticationFailure,
    MissingConfiguration,
    ValidationFailure,
    SyncFailure,
    UploadFailure,
    EmailDeliveryFailure,
    PaymentFailure,
}

/// One healable category: a message regex plus an error-type hint.
#[derive(Debug, Clone)]
pub struct HealablePattern {
    pub category: HealableCategory,
    pub message: Regex,
    /// Matched against the normalized error type (lowercase alphanumerics).
    pub type_hint: &'static str,
}

impl HealablePattern {
    fn matches(&self, normalized_type: &str, message: &str) -> bool {
        normalized_type.contains(self.type_hint) || self.message.is_match(message)
    }
}

/// Why the gate refused to auto-heal.
#[derive(Debug, Clone, PartialEq)]
pub enum GateRejection {
    CriticalSeverity,
    NoKnownPattern,
    PoorTrackRecord { success_rate: f64, attempts: usize },
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateRejection::CriticalSeverity => write!(f, "critical severity errors are never auto-healed"),
            GateRejection::NoKnownPattern => write!(f, "error does not match any known-healable pattern"),
            GateRejection::PoorTrackRecord { success_rate, attempts } => write!(
                f,
                "historical success rate {:.0}% over {} attempts is too low",
                success_rate * 100.0,
                attempts
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Proceed(HealableCategory),
    Escalate(GateRejection),
}

pub struct ErrorClassifier {
    patterns: Vec<HealablePattern>,
    min_success_rate: f64,
}

impl ErrorClassifier {
    pub fn new(min_success_rate: f64) -> Self {
        Self {
            patterns: Self::default_patterns(),
            min_success_rate,
        }
    }

    /// Keyword-driven severity. Checked from most to least severe.
    pub fn severity(error_type: &str, message: &str) -> Severity {
        let haystack = format!("{} {}", error_type, message).to_lowercase();

        if haystack.contains("corruption") || haystack.contains("database") {
            Severity::Critical
        } else if haystack.contains("payment") || haystack.contains("authenticat") {
            Severity::High
        } else if haystack.contains("timeout")
            || haystack.contains("timed out")
            || haystack.contains("connection")
        {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// First healable category the event matches, if any.
    pub fn match_category(&self, error_type: &str, message: &str) -> Option<HealableCategory> {
        let normalized = normalize_type(error_type);
        self.patterns
            .iter()
            .find(|p| p.matches(&normalized, message))
            .map(|p| p.category)
    }

    pub fn gate(&self, event: &ErrorEvent, history: &[HealingAttempt]) -> GateDecision {
        if event.severity == Severity::Critical {
            return GateDecision::Escalate(GateRejection::CriticalSeverity);
        }

        let Some(category) = self.match_category(&event.error_type, &event.message) else {
            return GateDecision::Escalate(GateRejection::NoKnownPattern);
        };

        if let Some(rate) = success_rate(history) {
            if rate <= self.min_success_rate {
                return GateDecision::Escalate(GateRejection::PoorTrackRecord {
                    success_rate: rate,
                    attempts: history.len(),
                });
            }
        }

        GateDecision::Proceed(category)
    }

    pub fn is_healable(&self, event: &ErrorEvent, history: &[HealingAttempt]) -> bool {
        matches!(self.gate(event, history), GateDecision::Proceed(_))
    }

    fn default_patterns() -> Vec<HealablePattern> {
        let pattern = |category, regex: &str, type_hint| HealablePattern {
            category,
            message: Regex::new(regex).unwrap(),
            type_hint,
        };

        vec![
            pattern(
                HealableCategory::ConnectionFailure,
                r"(?i)connection (?:refused|reset|failed|error|closed|lost)|econnrefused|econnreset|could not connect",
                "connection",
            ),
            pattern(
                HealableCategory::Timeout,
                r"(?i)time(?:d)?[ -]?out|etimedout|deadline exceeded",
                "timeout",
            ),
            pattern(
                HealableCategory::RateLimit,
                r"(?i)rate[ -]?limit|too many requests|\b429\b|throttl",
                "ratelimit",
            ),
            pattern(
                HealableCategory::AuthenticationFailure,
                r"(?i)authentication (?:failed|error)|invalid (?:token|credentials)|token (?:expired|invalid)|unauthenticated",
                "authentication",
            ),
            pattern(
                HealableCategory::MissingConfiguration,
                r"(?i)missing (?:config|configuration|setting)|config(?:uration)? (?:missing|not found|not set)|undefined config",
                "configuration",
            ),
            pattern(
                HealableCategory::ValidationFailure,
                r"(?i)validation (?:failed|error)|invalid input|failed validation",
                "validation",
            ),
            pattern(
                HealableCategory::SyncFailure,
                r"(?i)sync(?:hroni[sz]ation)? (?:failed|error)|out of sync",
                "sync",
            ),
            pattern(
                HealableCategory::UploadFailure,
                r"(?i)upload (?:failed|error)|failed to upload",
                "upload",
            ),
            pattern(
                HealableCategory::EmailDeliveryFailure,
                r"(?i)email (?:delivery )?(?:failed|error)|smtp|failed to send (?:e-?mail|notification)|bounced",
                "emaildelivery",
            ),
            pattern(
                HealableCategory::PaymentFailure,
                r"(?i)payment (?:failed|declined|error)|card declined|charge failed",
                "payment",
            ),
        ]
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(0.7)
    }
}

fn normalize_type(error_type: &str) -> String {
    error_type
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
