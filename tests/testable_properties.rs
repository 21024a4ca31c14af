//! Integration tests exercising the pipeline's quantified invariants against
//! the in-process engine — no network layer, so the tests stay deterministic
//! and fast.

use credit_he::codec::EncodedCiphertext;
use credit_he::crypto::CryptoSession;
use credit_he::errors::InferenceError;
use credit_he::keys::KeyMaterial;
use credit_he::model::{reference_logit, reference_sigmoid, FEATURE_COUNT};
use credit_he::params::ParameterProfile;
use credit_he::{inference, sigmoid};
use sealy::{CKKSEncoder, CKKSEvaluator};

/// Level discipline: every ciphertext produced anywhere in the pipeline
/// carries `0 <= level <= MaxLevel`.
#[test]
fn level_discipline_holds_through_a_full_request() {
    let profile = ParameterProfile::canonical().unwrap();
    let session = CryptoSession::new(&profile).unwrap();
    let keys = KeyMaterial::generate(&profile).unwrap();

    let features = [4.0, 0.2, 20.0, 1.0, 5.0];
    let cts: Vec<EncodedCiphertext> = features
        .iter()
        .map(|x| session.encrypt(&profile, keys.public_key(), *x).unwrap())
        .collect();

    for ct in &cts {
        assert!(ct.level() <= profile.max_level());
    }

    let cts: [EncodedCiphertext; FEATURE_COUNT] = cts.try_into().ok().unwrap();
    let evaluator = CKKSEvaluator::new(profile.context()).unwrap();
    let encoder = CKKSEncoder::new(profile.context(), profile.default_scale()).unwrap();
    let (_result, level_after, _scale) =
        inference::run(&profile, &evaluator, &encoder, keys.relinearization_key(), &cts).unwrap();

    assert!(level_after <= profile.max_level());
}

/// Serialization round-trip: deserializing then re-serializing a freshly
/// encrypted ciphertext, with no operations performed, yields byte-identical
/// output — including the `(level, scale)` header.
#[test]
fn serialization_round_trip_is_byte_identical() {
    let profile = ParameterProfile::canonical().unwrap();
    let session = CryptoSession::new(&profile).unwrap();
    let keys = KeyMaterial::generate(&profile).unwrap();

    let ct = session.encrypt(&profile, keys.public_key(), 0.37).unwrap();
    let original_bytes = ct.to_bytes().unwrap();

    let restored = EncodedCiphertext::from_bytes(&profile, &original_bytes).unwrap();
    let round_tripped_bytes = restored.to_bytes().unwrap();

    assert_eq!(original_bytes, round_tripped_bytes);
    assert_eq!(ct.level(), restored.level());
    assert_eq!(ct.scale(), restored.scale());
}

/// Key-parameter binding: a relinearization key generated under a different
/// `ParameterProfile` must be rejected as `BadKey` before any compute runs.
///
/// Exercises the "parameter mismatch" scenario: ciphertexts encrypted under
/// ring-degree exponent 14 submitted against a server configured for
/// exponent 13.
#[test]
fn mismatched_parameter_profile_is_rejected_as_bad_key_or_bad_ciphertext() {
    let server_profile = ParameterProfile::canonical().unwrap();
    let client_profile = ParameterProfile::with_ring_degree_exponent(14).unwrap();

    let client_session = CryptoSession::new(&client_profile).unwrap();
    let client_keys = KeyMaterial::generate(&client_profile).unwrap();

    let ct = client_session.encrypt(&client_profile, client_keys.public_key(), 0.5).unwrap();
    let ct_bytes = ct.to_bytes().unwrap();

    let relin_bytes = credit_he::codec::relin_key_to_bytes(client_keys.relinearization_key()).unwrap();

    // The server deserializes both against *its own* profile.
    let ct_result = EncodedCiphertext::from_bytes(&server_profile, &ct_bytes);
    let key_result = credit_he::codec::relin_key_from_bytes(&server_profile, &relin_bytes);

    assert!(
        matches!(ct_result, Err(InferenceError::BadCiphertext(_)))
            || matches!(key_result, Err(InferenceError::BadKey(_))),
        "a cross-profile submission must fail closed as BadCiphertext or BadKey"
    );
}

/// Approximation bound: for every sampled logit in the fit range, the
/// (plaintext) polynomial sigmoid differs from the exact logistic function
/// by at most 5e-3 (degree 3) — the encrypted pipeline adds level/scale
/// bookkeeping on top of this but should not move the error by more than a
/// small additional margin.
#[test]
fn polynomial_sigmoid_approximation_bound_on_fit_range() {
    let mut x = -3.0_f64;
    while x <= -1.0 {
        let exact = reference_sigmoid(x);
        let approx = horner(&sigmoid::DEGREE_3, x);
        assert!((exact - approx).abs() <= 5e-3, "x={x} exact={exact} approx={approx}");

        let approx5 = horner(&sigmoid::DEGREE_5, x);
        assert!((exact - approx5).abs() <= 5e-5, "x={x} exact={exact} approx5={approx5}");

        x += 0.05;
    }
}

fn horner(coeffs: &[f64], x: f64) -> f64 {
    let mut acc = 0.0;
    let mut pow = 1.0;
    for c in coeffs {
        acc += c * pow;
        pow *= x;
    }
    acc
}

/// Idempotent encoding: encrypting then decrypting a scalar recovers it
/// within the scale's expected precision.
#[test]
fn encode_decode_round_trip_within_scale_precision() {
    let profile = ParameterProfile::canonical().unwrap();
    let session = CryptoSession::new(&profile).unwrap();
    let mut keys = KeyMaterial::generate(&profile).unwrap();

    for v in [0.0_f64, 0.25, 0.5, 0.75, 1.0] {
        let ct = session.encrypt(&profile, keys.public_key(), v).unwrap();
        let sk = keys.secret_key_for_decrypt(&profile).unwrap().unwrap();
        let out = session.decrypt_and_clamp(&profile, &sk, &ct).unwrap();
        assert!((out - v).abs() < 1e-6, "v={v} out={out}");
    }
}

/// Range clamp: the full inference pipeline's decrypted output lies in
/// `[-0.05, 1.05]` before the client-side clamp, and `[0, 1]` after it, for
/// every one of the three canonical applicant scenarios.
#[test]
fn full_inference_output_is_clamped_into_unit_interval() {
    let profile = ParameterProfile::canonical().unwrap();
    let session = CryptoSession::new(&profile).unwrap();
    let mut keys = KeyMaterial::generate(&profile).unwrap();
    let evaluator = CKKSEvaluator::new(profile.context()).unwrap();
    let encoder = CKKSEncoder::new(profile.context(), profile.default_scale()).unwrap();

    for features in [
        [4.0, 0.2, 20.0, 1.0, 5.0],
        [4.4, 1.0, 24.0, 1.0, 1.7],
        [6.0, 5.0, 80.0, 3.0, 1.0],
    ] {
        let expected = reference_sigmoid(reference_logit(&features));

        let cts: Vec<EncodedCiphertext> = features
            .iter()
            .map(|x| session.encrypt(&profile, keys.public_key(), *x).unwrap())
            .collect();
        let cts: [EncodedCiphertext; FEATURE_COUNT] = cts.try_into().ok().unwrap();

        let (result_ct, level, scale) =
            inference::run(&profile, &evaluator, &encoder, keys.relinearization_key(), &cts).unwrap();
        let wrapped = EncodedCiphertext::new(result_ct, level, scale);

        let sk = keys.secret_key_for_decrypt(&profile).unwrap().unwrap();
        let got = session.decrypt_and_clamp(&profile, &sk, &wrapped).unwrap();

        assert!((0.0..=1.0).contains(&got), "got={got}");
        assert!((got - expected).abs() < 0.01, "got={got} expected={expected}");
    }
}

/// Secret-key hygiene: after the session wipes the secret key, its backing
/// buffer reads as all-zero bytes.
#[test]
fn secret_key_buffer_is_zeroed_after_wipe() {
    let profile = ParameterProfile::canonical().unwrap();
    let mut keys = KeyMaterial::generate(&profile).unwrap();

    let _sk = keys.secret_key_for_decrypt(&profile).unwrap().unwrap();
    keys.wipe_secret();

    assert!(keys.secret_is_wiped(), "secret key buffer must read all-zero after wipe_secret");

    // A second attempt to reconstruct the secret key must fail closed: the
    // wiped buffer no longer deserializes into a valid `sealy::SecretKey`.
    let after_wipe = keys.secret_key_for_decrypt(&profile);
    assert!(after_wipe.is_err() || after_wipe.unwrap().is_none());
}
