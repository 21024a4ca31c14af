//! Crate root: public surface and protocol-wide invariants for the
//! privacy-preserving credit-scoring inference pipeline.
//!
//! This crate is the **encrypted inference core**: it deserializes client
//! ciphertexts and a relinearization key, evaluates a fixed
//! logistic-regression model under a leveled CKKS scheme (via `sealy`, a
//! binding over Microsoft SEAL), and returns a ciphertext whose decryption is
//! a default-probability estimate. The HTTP transport, the browser-hosted
//! client UI, and model training are external collaborators — see
//! `src/bin/server.rs` and `src/bin/client.rs` for the thin binaries that
//! wrap this core with a wire protocol.
//!
//! ## Invariants
//!
//! - **One parameter profile.** Every ciphertext, plaintext, and key handled
//!   by any component in this crate is produced under the same
//!   [`params::ParameterProfile`]. A mismatch between the profile a
//!   relinearization key was generated under and the profile ciphertexts in
//!   the same request were encrypted under is a fatal, user-visible error
//!   ([`errors::InferenceError::BadKey`] or
//!   [`errors::InferenceError::BadCiphertext`]) with a "regenerate keys"
//!   message — never a silently wrong answer.
//!
//! - **Level discipline.** A ciphertext's level never goes negative. Every
//!   multiplicative operation is immediately followed by a rescale; any step
//!   that would require a negative level fails with
//!   [`errors::InferenceError::NoiseBudgetExhausted`] before it is attempted.
//!
//! - **No process-wide evaluator.** A `sealy::CKKSEvaluator` is bound to one
//!   relinearization key, so the server never caches one across requests.
//!   The encoder, by contrast, is reused — see [`crypto::CryptoSession`].
//!
//! - **Key hygiene.** The secret key never leaves the client process, is
//!   zeroized immediately after each decryption, and is dropped outright
//!   after an idle timeout. See [`keys::KeyMaterial`].
//!
//! These invariants are enforced by construction across the submodules
//! below; a violation is always a precise [`errors::InferenceError`], never
//! undefined behavior or a silent numeric drift.

#![forbid(unsafe_code)]

/// Parameter Profile (C1): ring degree, modulus chain, scale, and slot count.
pub mod params;
/// The fixed logistic-regression model (weights, bias, feature ordering).
pub mod model;
/// Key Material (C2): secret/public/relinearization keys and their lifecycle.
pub mod keys;
/// Encoder/Encryptor/Decryptor (C3).
pub mod crypto;
/// Ciphertext Codec (C4): binary serialization preserving level/scale.
pub mod codec;
/// Polynomial Sigmoid (C5): the narrow-range logistic approximation.
pub mod sigmoid;
/// Inference Engine (C6): the weighted sum, bias, and sigmoid pipeline.
pub mod inference;
/// Crate-wide error taxonomy.
pub mod errors;
