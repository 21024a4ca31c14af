//! Key Material (C2): secret key, public key, and relinearization key
//! generated under a `ParameterProfile`.
//!
//! Lifecycle: generated once per client session. The secret key is zeroed
//! from memory immediately after decryption completes, and an idle session
//! (no decryption for 5 minutes) drops the secret key reference outright —
//! a future decryption attempt is rejected until keys are regenerated. The
//! relinearization key is the only key sent to the server, and is bound to
//! the ParameterProfile it was generated under: a mismatch must be rejected
//! as `BadKey` before any compute runs.

use std::time::{Duration, Instant};

use sealy::{FromBytes, KeyGenerator, PublicKey, RelinearizationKey, SecretKey, ToBytes};
use zeroize::Zeroize;

use crate::errors::{InferenceError, Result};
use crate::params::ParameterProfile;

/// Idle timeout after which a client session's secret key is dropped.
pub const SECRET_KEY_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Secret key material, zeroized on drop. Wraps `sealy::SecretKey`'s own
/// serialized bytes rather than the opaque handle, so the buffer this crate
/// controls can be overwritten deterministically at end of use as a
/// secret-key hygiene measure.
pub struct SecretKeyMaterial {
    bytes: Vec<u8>,
}

impl SecretKeyMaterial {
    fn from_sealy(sk: &SecretKey) -> Result<Self> {
        let bytes = sk
            .as_bytes()
            .map_err(|e| InferenceError::ComputeFailure(format!("serialize secret key: {e}")))?;
        Ok(Self { bytes })
    }

    /// Reconstruct the `sealy::SecretKey` handle for one decryption, without
    /// retaining it past that call.
    fn to_sealy(&self, profile: &ParameterProfile) -> Result<SecretKey> {
        SecretKey::from_bytes(profile.context(), &self.bytes)
            .map_err(|e| InferenceError::BadKey(format!("secret key deserialize: {e}")))
    }

    /// Best-effort memory hygiene: overwrite the backing buffer with zero
    /// bytes. Called automatically on `Drop`; also callable explicitly right
    /// after a decryption so the zeroed state is observable sooner than the
    /// session's eventual drop.
    pub fn wipe(&mut self) {
        self.bytes.zeroize();
    }

    /// True once `wipe` (or `Drop`) has run and every byte reads zero.
    pub fn is_wiped(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }
}

impl Drop for SecretKeyMaterial {
    fn drop(&mut self) {
        self.wipe();
    }
}

/// A client-side session's key material, plus the idle-timer that governs
/// secret-key destruction.
pub struct KeyMaterial {
    secret: Option<SecretKeyMaterial>,
    public: PublicKey,
    relin: RelinearizationKey,
    last_use: Instant,
}

impl KeyMaterial {
    /// Generate a fresh `(sk, pk, rlk)` triple under `profile`.
    ///
    /// `sealy`'s key generator draws its own entropy; this crate does not
    /// inject a custom RNG, so each call is independent and unpredictable
    /// but never reproducible across invocations.
    pub fn generate(profile: &ParameterProfile) -> Result<Self> {
        let key_gen = KeyGenerator::new(profile.context())
            .map_err(|e| InferenceError::ComputeFailure(format!("key generator: {e}")))?;

        let public = key_gen.create_public_key();
        let secret = key_gen.secret_key();
        let relin = key_gen
            .create_relinearization_keys()
            .map_err(|e| InferenceError::ComputeFailure(format!("relinearization keys: {e}")))?;

        Ok(Self {
            secret: Some(SecretKeyMaterial::from_sealy(&secret)?),
            public,
            relin,
            last_use: Instant::now(),
        })
    }

    /// The public key, used for client-side encryption.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// The relinearization key, serialized and sent to the server with every
    /// inference request.
    pub fn relinearization_key(&self) -> &RelinearizationKey {
        &self.relin
    }

    /// Reconstruct the secret key for one decryption, refreshing the idle
    /// timer. Returns `None` if the idle timeout has already elapsed or the
    /// key was previously wiped — callers must treat this as "reload your
    /// keys", not retry the same session.
    pub fn secret_key_for_decrypt(&mut self, profile: &ParameterProfile) -> Result<Option<SecretKey>> {
        if self.last_use.elapsed() > SECRET_KEY_IDLE_TIMEOUT {
            self.secret = None;
        }
        let Some(secret) = self.secret.as_ref() else {
            return Ok(None);
        };
        let sk = secret.to_sealy(profile)?;
        self.last_use = Instant::now();
        Ok(Some(sk))
    }

    /// Zero the secret-key buffer immediately, e.g. right after a
    /// decryption. Leaves the public and relinearization keys intact so the
    /// session can keep sending requests even though it can no longer
    /// decrypt without regenerating.
    pub fn wipe_secret(&mut self) {
        if let Some(secret) = self.secret.as_mut() {
            secret.wipe();
        }
    }

    /// True if the secret key has been wiped (its backing buffer is all
    /// zero), or if there is no secret key material held at all — both
    /// states mean this session cannot decrypt.
    pub fn secret_is_wiped(&self) -> bool {
        self.secret.as_ref().map(|s| s.is_wiped()).unwrap_or(true)
    }
}
