//! Encoder/Encryptor/Decryptor (C3).
//!
//! Encodes a real scalar into slot 0 of a plaintext polynomial, encrypts
//! under the public key, and decrypts + decodes back to a real scalar. The
//! encoder is constructed once per `CryptoSession` and reused across calls —
//! per-call construction costs tens of milliseconds and is the documented
//! performance trap this module exists to avoid.

use sealy::{CKKSEncoder, Decryptor, Encryptor, PublicKey, SecretKey};

use crate::codec::EncodedCiphertext;
use crate::errors::{InferenceError, Result};
use crate::params::ParameterProfile;

/// Warn threshold: a decrypted probability further than this from `[0, 1]`
/// gets logged even though it is still clamped.
const CLAMP_WARN_EPSILON: f64 = 0.05;

/// A reusable encoder bound to one `ParameterProfile`. Construct once per
/// process (client) or per profile (server, where it is only needed for
/// encoding plaintext weights, never for encrypting secret inputs).
pub struct CryptoSession {
    encoder: CKKSEncoder,
}

impl CryptoSession {
    /// Build the encoder against `profile`'s context, at the profile's
    /// default scale.
    pub fn new(profile: &ParameterProfile) -> Result<Self> {
        let encoder = CKKSEncoder::new(profile.context(), profile.default_scale())
            .map_err(|e| InferenceError::ComputeFailure(format!("encoder: {e}")))?;
        Ok(Self { encoder })
    }

    /// Encode `x` into slot 0 (remaining slots zero) and encrypt under
    /// `public_key`. The result starts at `MaxLevel` and the profile's
    /// default scale.
    pub fn encrypt(
        &self,
        profile: &ParameterProfile,
        public_key: &PublicKey,
        x: f64,
    ) -> Result<EncodedCiphertext> {
        let mut slots = vec![0.0f64; profile.max_slots()];
        slots[0] = x;

        let plaintext = self
            .encoder
            .encode(&slots)
            .map_err(|e| InferenceError::ComputeFailure(format!("encode: {e}")))?;

        let encryptor = Encryptor::with_public_key(profile.context(), public_key)
            .map_err(|e| InferenceError::ComputeFailure(format!("encryptor: {e}")))?;

        let ciphertext = encryptor
            .encrypt(&plaintext)
            .map_err(|e| InferenceError::ComputeFailure(format!("encrypt: {e}")))?;

        Ok(EncodedCiphertext::new(ciphertext, profile.max_level(), profile.default_scale()))
    }

    /// Decrypt `ct` under `secret_key` and return the real part of slot 0,
    /// clamped to `[0, 1]`. A value outside `[-ε, 1+ε]` is logged as a
    /// warning via `tracing` but is still clamped rather than rejected.
    pub fn decrypt_and_clamp(
        &self,
        profile: &ParameterProfile,
        secret_key: &SecretKey,
        ct: &EncodedCiphertext,
    ) -> Result<f64> {
        let decryptor = Decryptor::new(profile.context(), secret_key)
            .map_err(|e| InferenceError::ComputeFailure(format!("decryptor: {e}")))?;

        let plaintext = decryptor
            .decrypt(ct.inner())
            .map_err(|e| InferenceError::ComputeFailure(format!("decrypt: {e}")))?;

        let decoded = self
            .encoder
            .decode(&plaintext)
            .map_err(|e| InferenceError::ComputeFailure(format!("decode: {e}")))?;

        let raw = decoded.first().copied().unwrap_or(0.0);

        if raw < -CLAMP_WARN_EPSILON || raw > 1.0 + CLAMP_WARN_EPSILON {
            tracing::warn!(value = raw, "decrypted probability outside expected range");
        }

        Ok(raw.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyMaterial;

    #[test]
    fn encode_decode_round_trip_within_scale_precision() {
        let profile = ParameterProfile::canonical().unwrap();
        let session = CryptoSession::new(&profile).unwrap();
        let mut keys = KeyMaterial::generate(&profile).unwrap();

        for v in [0.0_f64, 0.1, 0.5, 0.999] {
            let ct = session.encrypt(&profile, keys.public_key(), v).unwrap();
            let sk = keys.secret_key_for_decrypt(&profile).unwrap().expect("fresh session");
            let out = session.decrypt_and_clamp(&profile, &sk, &ct).unwrap();
            assert!((out - v).abs() < 1e-6, "v={v} out={out}");
        }
    }
}
