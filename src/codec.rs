//! Ciphertext Codec (C4): deterministic binary serialization that preserves
//! level and scale metadata across a round trip.
//!
//! `sealy`'s own `ToBytes`/`FromBytes` serialize the ciphertext's polynomial
//! content but do not expose a stable, version-independent accessor for
//! `(level, scale)` on the deserialized side. This codec therefore prepends a
//! small explicit header ahead of the library's native bytes:
//!
//! ```text
//! [ level: u8 ][ scale: f64 big-endian ][ sealy-native ciphertext bytes ]
//! ```
//!
//! Deserialization cross-checks the header's level against
//! `ParameterProfile::max_level` and rejects anything out of range with
//! `BadCiphertext`, before attempting to reconstruct the library object —
//! satisfying the "reject out-of-range level with a distinct error kind"
//! requirement without paying for a failed native deserialize first.

use sealy::{Ciphertext, FromBytes, RelinearizationKey, ToBytes};

use crate::errors::{InferenceError, Result};
use crate::params::ParameterProfile;

const HEADER_LEN: usize = 1 + 8;

/// A ciphertext plus the level/scale metadata the wire format carries
/// alongside it.
pub struct EncodedCiphertext {
    level: u8,
    scale: f64,
    ciphertext: Ciphertext,
}

impl EncodedCiphertext {
    /// Wrap a freshly-produced ciphertext together with the level/scale it
    /// is known to carry at this point in the pipeline.
    pub fn new(ciphertext: Ciphertext, level: u8, scale: f64) -> Self {
        Self { level, scale, ciphertext }
    }

    /// The ciphertext's level at the time it was wrapped.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// The ciphertext's scale at the time it was wrapped.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Borrow the underlying `sealy` ciphertext.
    pub fn inner(&self) -> &Ciphertext {
        &self.ciphertext
    }

    /// Consume the wrapper, returning the underlying `sealy` ciphertext.
    pub fn into_inner(self) -> Ciphertext {
        self.ciphertext
    }

    /// Serialize to the codec's binary format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let native = self
            .ciphertext
            .as_bytes()
            .map_err(|e| InferenceError::InternalSerialization(format!("ciphertext: {e}")))?;
        let mut out = Vec::with_capacity(HEADER_LEN + native.len());
        out.push(self.level);
        out.extend_from_slice(&self.scale.to_be_bytes());
        out.extend_from_slice(&native);
        Ok(out)
    }

    /// Deserialize from the codec's binary format, validating the header
    /// level against `profile.max_level()` before touching the native bytes.
    pub fn from_bytes(profile: &ParameterProfile, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(InferenceError::BadCiphertext(
                "buffer shorter than codec header".to_string(),
            ));
        }
        let level = bytes[0];
        if level > profile.max_level() {
            return Err(InferenceError::BadCiphertext(format!(
                "level {level} exceeds MaxLevel {}",
                profile.max_level()
            )));
        }
        let scale = f64::from_be_bytes(bytes[1..HEADER_LEN].try_into().unwrap());
        let ciphertext = Ciphertext::from_bytes(profile.context(), &bytes[HEADER_LEN..])
            .map_err(|e| InferenceError::BadCiphertext(format!("native ciphertext: {e}")))?;
        Ok(Self { level, scale, ciphertext })
    }
}

/// Serialize a relinearization key to its canonical `sealy` bytes. No extra
/// header is needed here: the key is bound to one request and its level/
/// scale metadata is not separately meaningful the way a ciphertext's is.
pub fn relin_key_to_bytes(key: &RelinearizationKey) -> Result<Vec<u8>> {
    key.as_bytes()
        .map_err(|e| InferenceError::InternalSerialization(format!("relinearization key: {e}")))
}

/// Deserialize a relinearization key, surfacing failures as `BadKey` per the
/// key-parameter-binding testable property.
pub fn relin_key_from_bytes(profile: &ParameterProfile, bytes: &[u8]) -> Result<RelinearizationKey> {
    RelinearizationKey::from_bytes(profile.context(), bytes)
        .map_err(|e| InferenceError::BadKey(format!("relinearization key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoSession;

    #[test]
    fn ciphertext_round_trip_preserves_level_and_scale() {
        let profile = ParameterProfile::canonical().unwrap();
        let session = CryptoSession::new(&profile).unwrap();
        let keys = crate::keys::KeyMaterial::generate(&profile).unwrap();

        let ct = session.encrypt(&profile, keys.public_key(), 0.42).unwrap();
        let bytes = ct.to_bytes().unwrap();
        let restored = EncodedCiphertext::from_bytes(&profile, &bytes).unwrap();

        assert_eq!(ct.level(), restored.level());
        assert_eq!(ct.scale(), restored.scale());
        assert_eq!(bytes, restored.to_bytes().unwrap());
    }

    #[test]
    fn rejects_level_above_max_level() {
        let profile = ParameterProfile::canonical().unwrap();
        let mut bytes = vec![profile.max_level() + 1];
        bytes.extend_from_slice(&profile.default_scale().to_be_bytes());
        bytes.extend_from_slice(&[0u8; 16]);

        let err = EncodedCiphertext::from_bytes(&profile, &bytes).unwrap_err();
        assert!(matches!(err, InferenceError::BadCiphertext(_)));
    }
}
