// Path: crates/services/src/policy/mod.rs

//! Rule evaluation, risk scoring, and the ordered policy engine.
//!
//! Everything in this module is pure and non-suspending: the orchestrator
//! gathers stores, cartridge risk input, guardrail counters, and spend
//! snapshots up front, and the engine folds them into a `DecisionTrace` in
//! one synchronous pass.

/// Builds the flattened evaluation context rules are matched against.
pub mod context;
/// The ordered multi-check evaluator.
pub mod engine;
/// Boolean rule-tree evaluation.
pub mod rules;
/// Weighted risk scoring and composite adjustment.
pub mod risk;

pub use context::EvalContextBuilder;
pub use engine::{EngineInput, PolicyEngine};
pub use risk::{RiskScorerConfig, score, adjust_composite};
pub use rules::{evaluate_rule, RuleEvaluation};
