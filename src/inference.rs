//! Inference Engine (C6): `σ(Σ wᵢ·xᵢ + b)` evaluated under the leveled
//! scheme, given five feature ciphertexts and the request's relinearization
//! key.
//!
//! The algorithm is deliberately sequential — level alignment, then the
//! weighted sum (multiply-plain, immediate rescale, accumulate), then the
//! scale-compensated bias, then the polynomial sigmoid (see `sigmoid`) — and
//! every stage is logged with its level before/after so a level-discipline
//! violation surfaces in telemetry before it surfaces as a wrong answer.

use std::time::Instant;

use sealy::{CKKSEncoder, CKKSEvaluator, Ciphertext, RelinearizationKey};

use crate::codec::EncodedCiphertext;
use crate::errors::{InferenceError, Result};
use crate::model::{BIAS, FEATURE_COUNT, WEIGHTS};
use crate::params::ParameterProfile;
use crate::sigmoid;

/// The request-scoped state machine. Every request passes through
/// these states in order, or transitions to `Failed` at the state it was in
/// when an `InferenceError` was raised. Tracked only for telemetry; no
/// component branches on it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    /// Request bytes received, not yet validated.
    Received,
    /// Size caps checked against the configured limit.
    SizeValidated,
    /// Relinearization key deserialized and bound to this request.
    KeyMaterialized,
    /// All five feature ciphertexts deserialized.
    InputsMaterialized,
    /// The five ciphertexts have been dropped to a common level.
    LevelsAligned,
    /// `Σ wᵢ·xᵢ` computed and rescaled.
    WeightedSumComputed,
    /// The scale-compensated bias has been added.
    BiasApplied,
    /// The polynomial sigmoid has been evaluated.
    SigmoidApplied,
    /// The result ciphertext has been serialized.
    Serialized,
    /// The response has been written back to the transport.
    Sent,
}

/// Run the fixed logistic-regression model on five feature ciphertexts.
///
/// `features[i]` is interpreted positionally as the model's feature `i`
/// (`model::FEATURE_NAMES[i]`, weight `model::WEIGHTS[i]`) — callers must not
/// reorder the list. Returns the result ciphertext (`σ(logit)` in slot 0)
/// together with the level it exited the sigmoid at, for the caller's
/// telemetry.
pub fn run(
    profile: &ParameterProfile,
    evaluator: &CKKSEvaluator,
    encoder: &CKKSEncoder,
    rlk: &RelinearizationKey,
    features: &[EncodedCiphertext; FEATURE_COUNT],
) -> Result<(Ciphertext, u8, f64)> {
    // --- 1. Level alignment --------------------------------------------
    let t0 = Instant::now();
    let aligned_level = features.iter().map(|f| f.level()).min().unwrap();
    let mut aligned: Vec<Ciphertext> = Vec::with_capacity(FEATURE_COUNT);
    for f in features {
        aligned.push(mod_switch_down(evaluator, f.inner(), f.level(), aligned_level)?);
    }
    tracing::debug!(
        stage = "levels_aligned",
        level_before = ?features.iter().map(|f| f.level()).collect::<Vec<_>>(),
        level_after = aligned_level,
        elapsed_us = t0.elapsed().as_micros() as u64,
    );

    // --- 2. Weighted sum --------------------------------------------------
    let t1 = Instant::now();
    let mut sum_level = aligned_level;
    let mut sum_scale = profile.default_scale();
    let mut sum: Option<Ciphertext> = None;

    for (ct, weight) in aligned.iter().zip(WEIGHTS.iter()) {
        let mut slots = vec![0.0f64; profile.max_slots()];
        slots[0] = *weight;
        let weight_pt = encoder
            .encode(&slots)
            .map_err(|e| InferenceError::ComputeFailure(format!("weight encode: {e}")))?;

        let product = evaluator
            .multiply_plain(ct, &weight_pt)
            .map_err(|e| InferenceError::ComputeFailure(format!("weighted-sum multiply_plain: {e}")))?;

        // Immediate rescale: skipping this leaves the product at scale²,
        // which overflows the modulus budget and breaks every later add.
        let rescaled = evaluator
            .rescale_to_next(&product)
            .map_err(|e| InferenceError::ComputeFailure(format!("weighted-sum rescale: {e}")))?;

        sum = Some(match sum {
            None => rescaled,
            Some(acc) => evaluator
                .add(&acc, &rescaled)
                .map_err(|e| InferenceError::ComputeFailure(format!("weighted-sum add: {e}")))?,
        });
    }

    // Each weighted-sum term is `feature.scale * weight.scale` before its
    // rescale, i.e. `defaultScale²`; the rescale divides by the prime the
    // chain drops at `aligned_level`. In the canonical (non-uniform) chain
    // that first drop is the 60-bit boundary prime, not one of the interior
    // 40-bit primes, so `actualScale ≈ defaultScale²/2^60` lands nowhere near
    // `defaultScale` — which is why the bias below needs the
    // `actualScale/defaultScale` compensation factor.
    sum_scale = sum_scale * profile.default_scale() / profile.dropped_prime_scale(aligned_level);
    sum_level -= 1;
    let sum = sum.expect("FEATURE_COUNT >= 1");

    tracing::debug!(
        stage = "weighted_sum_computed",
        level_before = aligned_level,
        level_after = sum_level,
        elapsed_us = t1.elapsed().as_micros() as u64,
    );

    // --- 3. Bias addition ---------------------------------------------
    let t2 = Instant::now();
    // `sum`'s scale after the weighted-sum's single rescale is
    // `default_scale * (default_scale / q_dropped)`, not `default_scale`; the
    // bias plaintext must be encoded at that same scale, concretely
    // `BIAS * (actualScale/defaultScale)` encoded at `actualScale`, or the
    // bias silently lands 1-2 logit units off — catastrophic for a sigmoid.
    let bias_pt = {
        let bias_encoder = CKKSEncoder::new(profile.context(), sum_scale)
            .map_err(|e| InferenceError::ComputeFailure(format!("bias encoder: {e}")))?;
        let mut slots = vec![0.0f64; profile.max_slots()];
        slots[0] = BIAS * (sum_scale / profile.default_scale());
        bias_encoder
            .encode(&slots)
            .map_err(|e| InferenceError::ComputeFailure(format!("bias encode: {e}")))?
    };
    let with_bias = evaluator
        .add_plain(&sum, &bias_pt)
        .map_err(|e| InferenceError::ComputeFailure(format!("bias add_plain: {e}")))?;

    tracing::debug!(
        stage = "bias_applied",
        level_before = sum_level,
        level_after = sum_level,
        elapsed_us = t2.elapsed().as_micros() as u64,
    );

    // --- 4. Sigmoid ----------------------------------------------------
    let t3 = Instant::now();
    let level_before_sigmoid = sum_level;
    let (result, level_after_sigmoid, result_scale) =
        sigmoid::evaluate(profile, evaluator, encoder, rlk, &with_bias, sum_level, sum_scale)?;

    if level_after_sigmoid == 0 {
        tracing::warn!(
            stage = "sigmoid_applied",
            level_after = level_after_sigmoid,
            "noise budget exhausted after sigmoid; no further operations are possible on this result"
        );
    }
    let noise_budget_consumed_pct = 100.0
        * (1.0 - (level_after_sigmoid as f64 / profile.max_level().max(1) as f64));
    tracing::debug!(
        stage = "sigmoid_applied",
        level_before = level_before_sigmoid,
        level_after = level_after_sigmoid,
        noise_budget_consumed_pct,
        elapsed_us = t3.elapsed().as_micros() as u64,
    );

    Ok((result, level_after_sigmoid, result_scale))
}

fn mod_switch_down(
    evaluator: &CKKSEvaluator,
    ct: &Ciphertext,
    from_level: u8,
    to_level: u8,
) -> Result<Ciphertext> {
    let mut current = ct.clone();
    let mut level = from_level;
    while level > to_level {
        current = evaluator
            .mod_switch_to_next(&current)
            .map_err(|e| InferenceError::ComputeFailure(format!("level-align mod switch: {e}")))?;
        level -= 1;
    }
    Ok(current)
}
