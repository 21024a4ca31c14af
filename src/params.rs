//! Parameter Profile (C1): the single source of truth for ring degree,
//! modulus chain, scale, and slot count, shared by client and server.
//!
//! Constructed once per process and reused — constructing the underlying
//! `sealy::Context` per call is a documented performance trap (tens of
//! milliseconds each time), so callers should hold a `&'static ParameterProfile`
//! behind a `OnceLock` (server) or a lazily-initialized session handle (client).

use sealy::{
    CkksEncryptionParametersBuilder, CoefficientModulusFactory, Context, DegreeType,
    EncryptionParameters, SecurityLevel,
};

use crate::errors::{InferenceError, Result};

/// Canonical ring-degree exponent: 2^13 = 8192 lattice coefficients, 4096
/// usable encoding slots.
pub const RING_DEGREE_EXPONENT: u32 = 13;

/// Primary modulus chain, as bit-widths. Chain length 6 ⇒ `MAX_LEVEL = 5`.
pub const PRIMARY_MODULUS_BITS: [i32; 6] = [60, 40, 40, 40, 40, 60];

/// Auxiliary (special) modulus bit-widths, used for relinearization.
pub const AUX_MODULUS_BITS: [i32; 1] = [61];

/// Default scale exponent: `2^40`.
pub const DEFAULT_SCALE_BITS: u32 = 40;

/// Immutable, process-wide description of the leveled-HE parameters every
/// component must agree on.
pub struct ParameterProfile {
    degree: DegreeType,
    ring_degree: u64,
    max_level: u8,
    max_slots: usize,
    default_scale: f64,
    params: EncryptionParameters,
    context: Context,
}

impl ParameterProfile {
    /// Build the canonical production profile (ring-degree exponent 13).
    ///
    /// This is the only profile the server and the reference client
    /// construct; the crate exposes `with_ring_degree_exponent` purely so
    /// tests can construct a deliberately mismatched profile (see the
    /// "parameter mismatch" scenario).
    pub fn canonical() -> Result<Self> {
        Self::with_ring_degree_exponent(RING_DEGREE_EXPONENT)
    }

    /// Build a profile at an arbitrary ring-degree exponent, keeping the
    /// canonical modulus-chain shape. Only `13` is used in production; `14`
    /// exists so the test suite can exercise the "regenerate your keys"
    /// failure path without a second real deployment profile.
    pub fn with_ring_degree_exponent(exponent: u32) -> Result<Self> {
        let ring_degree = 1u64 << exponent;
        let degree = DegreeType::try_from(ring_degree)
            .map_err(|e| InferenceError::ComputeFailure(format!("unsupported ring degree: {e}")))?;

        let mut bit_sizes: Vec<i32> = PRIMARY_MODULUS_BITS.to_vec();
        bit_sizes.extend_from_slice(&AUX_MODULUS_BITS);

        let coeff_modulus = CoefficientModulusFactory::build(degree, &bit_sizes)
            .map_err(|e| InferenceError::ComputeFailure(format!("coefficient modulus: {e}")))?;

        let params = CkksEncryptionParametersBuilder::new()
            .set_poly_modulus_degree(degree)
            .set_coefficient_modulus(coeff_modulus)
            .build()
            .map_err(|e| InferenceError::ComputeFailure(format!("encryption parameters: {e}")))?;

        let context = Context::new(&params, true, SecurityLevel::TC128)
            .map_err(|e| InferenceError::ComputeFailure(format!("context: {e}")))?;

        Ok(Self {
            degree,
            ring_degree,
            max_level: (PRIMARY_MODULUS_BITS.len() - 1) as u8,
            max_slots: (ring_degree / 2) as usize,
            default_scale: 2f64.powi(DEFAULT_SCALE_BITS as i32),
            params,
            context,
        })
    }

    /// Ring degree (lattice dimension), e.g. `8192`.
    pub fn ring_degree(&self) -> u64 {
        self.ring_degree
    }

    /// `DegreeType` as required by `sealy` constructors.
    pub fn degree_type(&self) -> DegreeType {
        self.degree
    }

    /// Highest valid ciphertext level. A fresh ciphertext starts here.
    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    /// Number of usable encoding slots (`ring_degree / 2`).
    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    /// The default encoding scale, `2^DEFAULT_SCALE_BITS`.
    pub fn default_scale(&self) -> f64 {
        self.default_scale
    }

    /// The scale factor (`2^bits`) consumed by a single `rescale_to_next`
    /// applied to a ciphertext currently at `level`.
    ///
    /// `PRIMARY_MODULUS_BITS` is not uniform (`[60, 40, 40, 40, 40, 60]`):
    /// SEAL's rescale chain drops the highest-index remaining data prime
    /// first, so the very first rescale off `MaxLevel` consumes the chain's
    /// last (60-bit) entry, not one of the interior 40-bit primes. Callers
    /// that track a ciphertext's scale by hand (rather than querying it from
    /// the library) must index this by the level the rescale runs *from*.
    pub fn dropped_prime_scale(&self, level: u8) -> f64 {
        2f64.powi(PRIMARY_MODULUS_BITS[level as usize] as i32)
    }

    /// Borrow the underlying `sealy` encryption parameters.
    pub fn params(&self) -> &EncryptionParameters {
        &self.params
    }

    /// Borrow the underlying `sealy` context.
    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl std::fmt::Debug for ParameterProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterProfile")
            .field("ring_degree", &self.ring_degree)
            .field("max_level", &self.max_level)
            .field("max_slots", &self.max_slots)
            .field("default_scale", &self.default_scale)
            .finish()
    }
}
