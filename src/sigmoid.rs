//! Polynomial Sigmoid (C5) — the critical sub-component.
//!
//! `σ(x) = 1/(1+exp(-x))` is not computable under a leveled scheme, so a
//! low-degree monomial-basis polynomial, fitted on the model's narrow
//! operating range `[-3, -1]`, stands in for it. Evaluation proceeds by
//! building successive ciphertext powers of `x` (each power costs one
//! relinearize + rescale), then combining them with plaintext-encoded
//! coefficients that are mod-switched down to the lowest power's level
//! before the final sum — never by Horner's-method ciphertext-ciphertext
//! chaining, which doubles the scale at every step and is unrecoverable in
//! this narrow a range (see the module-level warning in `inference`).

use sealy::{CKKSEncoder, CKKSEvaluator, Ciphertext, RelinearizationKey};

use crate::errors::{InferenceError, Result};
use crate::params::ParameterProfile;

/// Degree-3 coefficients (monomial basis, ascending power), fitted by
/// least-squares against 1000 samples of `σ` on `[-3, -1]`.
/// Mean error on the fit range ≈ 7·10⁻⁵.
pub const DEGREE_3: [f64; 4] = [0.53163642, 0.32991445, 0.07323628, 0.00568278];

/// Degree-5 coefficients. Mean error on the fit range ≈ 2·10⁻⁶.
pub const DEGREE_5: [f64; 6] = [
    0.50181605,
    0.25298880,
    -0.00252808,
    -0.03002025,
    -0.00807291,
    -0.00070245,
];

/// Degree-7 coefficients. Mean error on the fit range ≈ 5·10⁻⁸.
pub const DEGREE_7: [f64; 8] = [
    0.50181605,
    0.25298880,
    -0.00252808,
    -0.03002025,
    -0.00807291,
    -0.00070245,
    0.00008102,
    0.00000487,
];

/// The coefficient set this build evaluates, selected by Cargo feature.
/// Default (no feature) is degree 3 — minimum depth, acceptable error in the
/// operating range.
pub fn active_coefficients() -> &'static [f64] {
    #[cfg(all(feature = "sigmoid-degree-7", not(feature = "sigmoid-degree-5")))]
    {
        &DEGREE_7
    }
    #[cfg(all(feature = "sigmoid-degree-5", not(feature = "sigmoid-degree-7")))]
    {
        &DEGREE_5
    }
    #[cfg(not(any(feature = "sigmoid-degree-5", feature = "sigmoid-degree-7")))]
    {
        &DEGREE_3
    }
    #[cfg(all(feature = "sigmoid-degree-5", feature = "sigmoid-degree-7"))]
    {
        compile_error!("sigmoid-degree-5 and sigmoid-degree-7 are mutually exclusive");
    }
}

/// Number of levels a given coefficient set's evaluation consumes: one per
/// power above the first (degree 3 → powers 1,2,3 → 2 levels).
pub fn depth_for(coeffs: &[f64]) -> u8 {
    (coeffs.len() as u8).saturating_sub(2).max(0)
}

/// One ciphertext power of `x`, tagged with the level/scale it was produced
/// at (needed to mod-switch lower powers down before combining).
struct Power {
    ct: Ciphertext,
    level: u8,
    scale: f64,
}

/// Evaluate the active polynomial sigmoid on `x`, which must enter at
/// `level` with `scale`. Returns the result ciphertext and its `(level,
/// scale)` after evaluation.
///
/// Fails with `NoiseBudgetExhausted` if `level` does not leave at least
/// `depth(sigmoid) + 1` levels of headroom, per the depth contract.
pub fn evaluate(
    profile: &ParameterProfile,
    evaluator: &CKKSEvaluator,
    encoder: &CKKSEncoder,
    rlk: &RelinearizationKey,
    x: &Ciphertext,
    level: u8,
    scale: f64,
) -> Result<(Ciphertext, u8, f64)> {
    let coeffs = active_coefficients();
    let depth = depth_for(coeffs);

    if (level as i16) - (depth as i16) - 1 < 0 {
        return Err(InferenceError::NoiseBudgetExhausted(format!(
            "sigmoid needs {} levels of headroom beyond its own depth of {depth}, have {level}",
            depth + 1
        )));
    }

    // Build successive powers x^1 .. x^(degree), each costing one
    // relinearize + rescale beyond the previous power.
    let degree = coeffs.len() - 1;
    let mut powers: Vec<Power> = Vec::with_capacity(degree);
    powers.push(Power { ct: x.clone(), level, scale });

    for _ in 2..=degree {
        let prev = powers.last().unwrap();
        // Bring the base power `x^1` down to the same level as `prev` via
        // mod-switch (drops modulus, leaves scale untouched).
        let base_at_level = mod_switch_down_to(evaluator, &powers[0], prev.level)?;

        let raw = evaluator
            .multiply(&prev.ct, &base_at_level)
            .map_err(|e| InferenceError::ComputeFailure(format!("sigmoid power multiply: {e}")))?;
        let relin = evaluator
            .relinearize(&raw, rlk)
            .map_err(|e| InferenceError::ComputeFailure(format!("sigmoid relinearize: {e}")))?;
        let rescaled = evaluator
            .rescale_to_next(&relin)
            .map_err(|e| InferenceError::ComputeFailure(format!("sigmoid rescale: {e}")))?;

        powers.push(Power {
            ct: rescaled,
            level: prev.level - 1,
            scale: prev.scale * scale / profile.dropped_prime_scale(prev.level),
        });
    }

    // The lowest power (the highest-degree one) sets the level every other
    // term must be brought down to before multiply_plain. Each term's
    // `multiply_plain` (at the coefficient's encoding scale) followed by its
    // own `rescale_to_next` (÷ the dropped prime) is scale-neutral whenever
    // the coefficient is encoded at the dropped prime's scale — which
    // `encode_scalar` does by construction — so the accumulator lands at
    // exactly `powers.last().scale`, not a further-divided value.
    let combine_level = powers.last().unwrap().level;
    let output_level = combine_level.saturating_sub(1);
    let output_scale = powers.last().unwrap().scale;

    // Accumulate the ciphertext-term contributions (coeffs[1..]) first; the
    // constant term (coeffs[0]) has no ciphertext power to multiply against,
    // so it is folded in afterwards via `add_plain` directly against the
    // running accumulator rather than manufactured into a fresh ciphertext.
    let mut acc: Option<Ciphertext> = None;
    for (i, power) in powers.iter().enumerate() {
        let coeff = coeffs[i + 1];
        let term_at_level = mod_switch_down_to(evaluator, power, combine_level)?;
        let weight = encode_scalar(encoder, profile, coeff)?;
        let product = evaluator
            .multiply_plain(&term_at_level, &weight)
            .map_err(|e| InferenceError::ComputeFailure(format!("sigmoid term multiply_plain: {e}")))?;
        let product = evaluator
            .rescale_to_next(&product)
            .map_err(|e| InferenceError::ComputeFailure(format!("sigmoid term rescale: {e}")))?;
        acc = Some(match acc {
            None => product,
            Some(prev) => evaluator
                .add(&prev, &product)
                .map_err(|e| InferenceError::ComputeFailure(format!("sigmoid term add: {e}")))?,
        });
    }
    // `degree >= 1` always holds (the smallest coefficient set is degree 3),
    // so `powers` is never empty and `acc` is always populated by the loop.
    let acc = acc.expect("sigmoid polynomial has at least one ciphertext term");

    let const_pt = encode_scalar_at_scale(profile, coeffs[0], output_scale)?;
    let acc = evaluator
        .add_plain(&acc, &const_pt)
        .map_err(|e| InferenceError::ComputeFailure(format!("sigmoid constant add_plain: {e}")))?;

    Ok((acc, output_level, output_scale))
}

fn mod_switch_down_to(evaluator: &CKKSEvaluator, power: &Power, target_level: u8) -> Result<Ciphertext> {
    let mut ct = power.ct.clone();
    let mut level = power.level;
    while level > target_level {
        ct = evaluator
            .mod_switch_to_next(&ct)
            .map_err(|e| InferenceError::ComputeFailure(format!("sigmoid mod switch: {e}")))?;
        level -= 1;
    }
    Ok(ct)
}

/// Encode a bare scalar weight at the shared encoder's (default) scale. Used
/// for the per-power coefficients: a `multiply_plain` against a plaintext at
/// the default scale followed by one `rescale_to_next` restores the
/// ciphertext operand's own scale, since the default scale and the dropped
/// prime are both `2^DEFAULT_SCALE_BITS` in the canonical chain.
fn encode_scalar(encoder: &CKKSEncoder, profile: &ParameterProfile, value: f64) -> Result<sealy::Plaintext> {
    let mut slots = vec![0.0f64; profile.max_slots()];
    slots[0] = value;
    encoder
        .encode(&slots)
        .map_err(|e| InferenceError::ComputeFailure(format!("sigmoid coefficient encode: {e}")))
}

/// Encode the constant term at an arbitrary target scale so it can be
/// `add_plain`'d directly into the accumulator without an extra rescale.
/// `sealy`'s `CKKSEncoder` binds one scale per instance, so a throwaway
/// encoder is built for this one-off encoding rather than reusing the
/// per-session encoder (which is pinned to the profile's default scale).
fn encode_scalar_at_scale(profile: &ParameterProfile, value: f64, scale: f64) -> Result<sealy::Plaintext> {
    let encoder = CKKSEncoder::new(profile.context(), scale)
        .map_err(|e| InferenceError::ComputeFailure(format!("sigmoid constant-term encoder: {e}")))?;
    let mut slots = vec![0.0f64; profile.max_slots()];
    slots[0] = value;
    encoder
        .encode(&slots)
        .map_err(|e| InferenceError::ComputeFailure(format!("sigmoid coefficient encode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degree_3_depth_is_two_levels() {
        assert_eq!(depth_for(&DEGREE_3), 2);
    }

    #[test]
    fn degree_5_consumes_more_depth_than_degree_3() {
        assert!(depth_for(&DEGREE_5) > depth_for(&DEGREE_3));
    }

    #[test]
    fn polynomial_approximates_sigmoid_on_fit_range() {
        let mut x = -3.0;
        while x <= -1.0 {
            let exact = crate::model::reference_sigmoid(x);
            let approx = horner_reference(&DEGREE_3, x);
            assert!((exact - approx).abs() < 5e-3, "x={x} exact={exact} approx={approx}");
            x += 0.05;
        }
    }

    /// Plain (non-homomorphic) evaluation of the monomial-basis polynomial,
    /// used only to validate the fitted coefficients themselves.
    fn horner_reference(coeffs: &[f64], x: f64) -> f64 {
        let mut acc = 0.0;
        let mut pow = 1.0;
        for c in coeffs {
            acc += c * pow;
            pow *= x;
        }
        acc
    }
}
