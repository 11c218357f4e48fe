//! Self-healing remediation pipeline
//!
//! A reported failure is classified, gated on severity, known patterns and
//! past success, handed to a plan generator, checked for destructive intent,
//! and executed through a registry of action handlers. Anything the pipeline
//! will not or cannot fix is escalated to human support.

pub mod actions;
pub mod classifier;
pub mod inflight;
pub mod orchestrator;
pub mod planner;
pub mod safety;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use classifier::{ErrorClassifier, GateDecision};
pub use orchestrator::HealingOrchestrator;
pub use planner::AiPlanGenerator;
pub use safety::{SafetyValidator, SafetyVerdict};
pub use types::{ErrorEvent, ErrorReport, ErrorSignature};
