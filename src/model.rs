//! The fixed logistic-regression model evaluated by the Inference Engine.
//!
//! Weights and bias are compiled in, not configurable at runtime — there is
//! no adaptive model selection, and the polynomial sigmoid (see `sigmoid`)
//! is only valid for the logit range this exact model produces.

/// Number of input features the model consumes, and the number of
/// ciphertexts an inference request must carry.
pub const FEATURE_COUNT: usize = 5;

/// Feature ordering, matched positionally against `WEIGHTS`. Feature `i`
/// always receives weight `WEIGHTS[i]`; callers must not reorder the
/// serialized feature list.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "age/10",
    "loan_to_income",
    "debt_to_income",
    "credit_amount/1e5",
    "income/1e5",
];

/// Model weights, one per feature in `FEATURE_NAMES` order.
pub const WEIGHTS: [f64; FEATURE_COUNT] = [
    -0.2501752295,
    0.0137090654,
    0.0123900347,
    -0.0426762083,
    0.0062886554,
];

/// Model bias (intercept).
pub const BIAS: f64 = -1.4136778933;

/// Plaintext reference evaluation of the model: `Σ wᵢ·xᵢ + b`, followed by
/// the exact (non-polynomial) logistic function. Used by tests to compute
/// the expected value an encrypted run should approximate.
pub fn reference_logit(features: &[f64; FEATURE_COUNT]) -> f64 {
    WEIGHTS.iter().zip(features.iter()).map(|(w, x)| w * x).sum::<f64>() + BIAS
}

/// Exact logistic function, `1 / (1 + exp(-x))`.
pub fn reference_sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_risk_scenario_matches_expected_logit() {
        let features = [4.0, 0.2, 20.0, 1.0, 5.0];
        let logit = reference_logit(&features);
        assert!((logit - (-2.176)).abs() < 0.01, "logit={logit}");
        let p = reference_sigmoid(logit);
        assert!((p - 0.102).abs() < 0.01, "p={p}");
    }

    #[test]
    fn medium_and_high_risk_scenarios_land_in_the_sigmoid_fit_range() {
        // The fit range for the polynomial sigmoid is [-3, -1]; every
        // canonical scenario's plaintext logit must land inside it, or the
        // polynomial approximation (tuned for this narrow range) is
        // meaningless for that input.
        for features in [
            [4.4, 1.0, 24.0, 1.0, 1.7],
            [6.0, 5.0, 80.0, 3.0, 1.0],
        ] {
            let logit = reference_logit(&features);
            assert!((-3.0..=-1.0).contains(&logit), "logit={logit} out of fit range");
            let p = reference_sigmoid(logit);
            assert!((0.08..=0.15).contains(&p), "p={p}");
        }
    }
}
