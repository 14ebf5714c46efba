//! Controller gate: routes a plan to execution or debate.
//!
//! Confidence and entropy are opaque signals produced by the reasoning
//! backend. The gate only compares them against the run's thresholds.

use serde::{Deserialize, Serialize};

/// Thresholds and bounds fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    /// Plans below this confidence are debated
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Plans above this entropy are debated
    #[serde(default = "default_max_entropy")]
    pub max_entropy: f64,
    /// Reflection cycles allowed before escalating
    #[serde(default = "default_max_reflection_iterations")]
    pub max_reflection_iterations: u32,
    /// Debate rounds allowed before a forced proceed
    #[serde(default = "default_max_debate_rounds")]
    pub max_debate_rounds: u32,
    /// Per-task token budget
    #[serde(default = "default_escalation_token_budget")]
    pub escalation_token_budget: u64,
}

fn default_min_confidence() -> f64 {
    0.6
}

fn default_max_entropy() -> f64 {
    0.7
}

fn default_max_reflection_iterations() -> u32 {
    2
}

fn default_max_debate_rounds() -> u32 {
    3
}

fn default_escalation_token_budget() -> u64 {
    200_000
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_entropy: default_max_entropy(),
            max_reflection_iterations: default_max_reflection_iterations(),
            max_debate_rounds: default_max_debate_rounds(),
            escalation_token_budget: default_escalation_token_budget(),
        }
    }
}

/// Routing decision for a freshly proposed plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Debate,
}

/// Outcome of re-evaluating the gate after a debate round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebateVerdict {
    /// The refined plan passes the gate
    Converged,
    /// Still failing, rounds remain
    Continue,
    /// Still failing and out of rounds; execute anyway, flagged low-confidence
    ForcedProceed,
}

/// Clamp a signal into `[0, 1]`. NaN stays NaN so that it fails every comparison.
fn clamp_signal(value: f64) -> f64 {
    if value.is_nan() {
        value
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn passes(confidence: f64, entropy: f64, thresholds: &GateThresholds) -> bool {
    let confidence = clamp_signal(confidence);
    let entropy = clamp_signal(entropy);
    // Written positively so NaN on either side fails the gate
    confidence >= thresholds.min_confidence && entropy <= thresholds.max_entropy
}

/// Debate iff `confidence < min_confidence` or `entropy > max_entropy`.
pub fn evaluate(confidence: f64, entropy: f64, thresholds: &GateThresholds) -> GateDecision {
    if passes(confidence, entropy, thresholds) {
        GateDecision::Proceed
    } else {
        GateDecision::Debate
    }
}

/// Re-evaluate after `rounds_used` debate rounds have completed.
pub fn after_debate(
    confidence: f64,
    entropy: f64,
    rounds_used: u32,
    thresholds: &GateThresholds,
) -> DebateVerdict {
    if passes(confidence, entropy, thresholds) {
        DebateVerdict::Converged
    } else if rounds_used >= thresholds.max_debate_rounds {
        DebateVerdict::ForcedProceed
    } else {
        DebateVerdict::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let t = GateThresholds::default();
        assert_eq!(t.min_confidence, 0.6);
        assert_eq!(t.max_entropy, 0.7);
        assert_eq!(t.max_reflection_iterations, 2);
        assert_eq!(t.max_debate_rounds, 3);
        assert_eq!(t.escalation_token_budget, 200_000);
    }

    #[test]
    fn test_evaluate_examples() {
        let t = GateThresholds::default();
        assert_eq!(evaluate(0.8, 0.2, &t), GateDecision::Proceed);
        assert_eq!(evaluate(0.3, 0.2, &t), GateDecision::Debate);
        assert_eq!(evaluate(0.8, 0.9, &t), GateDecision::Debate);
    }

    #[test]
    fn test_evaluate_boundaries_pass() {
        let t = GateThresholds::default();
        assert_eq!(evaluate(0.6, 0.7, &t), GateDecision::Proceed);
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let t = GateThresholds::default();
        for _ in 0..10 {
            assert_eq!(evaluate(0.55, 0.4, &t), GateDecision::Debate);
        }
    }

    #[test]
    fn test_nan_fails_gate() {
        let t = GateThresholds::default();
        assert_eq!(evaluate(f64::NAN, 0.1, &t), GateDecision::Debate);
        assert_eq!(evaluate(0.9, f64::NAN, &t), GateDecision::Debate);
    }

    #[test]
    fn test_out_of_range_signals_are_clamped() {
        let t = GateThresholds::default();
        assert_eq!(evaluate(1.7, -0.5, &t), GateDecision::Proceed);
        assert_eq!(evaluate(-3.0, 0.1, &t), GateDecision::Debate);
    }

    #[test]
    fn test_after_debate_verdicts() {
        let t = GateThresholds::default();
        assert_eq!(after_debate(0.9, 0.1, 1, &t), DebateVerdict::Converged);
        assert_eq!(after_debate(0.4, 0.1, 1, &t), DebateVerdict::Continue);
        assert_eq!(after_debate(0.4, 0.1, 3, &t), DebateVerdict::ForcedProceed);
        // Converging on the last round is still a convergence
        assert_eq!(after_debate(0.9, 0.1, 3, &t), DebateVerdict::Converged);
    }

    #[test]
    fn test_thresholds_deserialize_with_partial_fields() {
        let t: GateThresholds = toml::from_str("min_confidence = 0.75").unwrap();
        assert_eq!(t.min_confidence, 0.75);
        assert_eq!(t.max_debate_rounds, 3);
    }
}
