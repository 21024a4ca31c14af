//! Crate-wide error taxonomy.
//!
//! Every failure mode surfaced by this crate is one of these variants; there
//! is no bare `anyhow::Error` boundary inside the library. The server binary
//! maps each variant to an HTTP status code (see `bin/server.rs`); the client
//! binary matches on `BadCiphertext`/`BadKey` to prompt for key regeneration
//! rather than retrying.

use thiserror::Error;

/// A distinct, loggable failure kind for one inference request.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Malformed JSON, wrong feature count, or a missing relinearization key.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A serialized buffer exceeded the configured size cap.
    #[error("buffer of {got} bytes exceeds the {limit} byte cap")]
    BadSize {
        /// Size actually observed, in bytes.
        got: usize,
        /// Configured cap, in bytes.
        limit: usize,
    },

    /// Base64 decoding failed.
    #[error("base64 decode failed: {0}")]
    BadEncoding(String),

    /// Ciphertext deserialization failed, or its level fell outside
    /// `[0, MaxLevel]`. Usually a parameter-profile mismatch between client
    /// and server.
    #[error("bad ciphertext: {0} (regenerate keys with matching parameters)")]
    BadCiphertext(String),

    /// The relinearization key failed to deserialize, or was generated under
    /// a different parameter profile than the ciphertexts it accompanies.
    #[error("bad relinearization key: {0} (regenerate keys with matching parameters)")]
    BadKey(String),

    /// A step would have required a negative ciphertext level.
    #[error("noise budget exhausted: {0}")]
    NoiseBudgetExhausted(String),

    /// The underlying HE library failed unexpectedly (e.g. a rescale error).
    #[error("compute failure: {0}")]
    ComputeFailure(String),

    /// The result ciphertext failed to serialize.
    #[error("internal serialization failure: {0}")]
    InternalSerialization(String),
}

impl InferenceError {
    /// A short, stable tag for structured log fields (never logs payload
    /// content — see the module doc on what must stay out of logs).
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::BadRequest(_) => "bad_request",
            InferenceError::BadSize { .. } => "bad_size",
            InferenceError::BadEncoding(_) => "bad_encoding",
            InferenceError::BadCiphertext(_) => "bad_ciphertext",
            InferenceError::BadKey(_) => "bad_key",
            InferenceError::NoiseBudgetExhausted(_) => "noise_budget_exhausted",
            InferenceError::ComputeFailure(_) => "compute_failure",
            InferenceError::InternalSerialization(_) => "internal_serialization",
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, InferenceError>;
