//! Homomorphic scheme provider.
//!
//! Amounts are carried by BFV (`fhe` crate) with fixed-point packing: a value
//! `v` becomes `round(v * 2^scaling_bits)` in coefficient 0 of a plaintext whose
//! first `batch_size` slots are populated; the other slots stay zero and are
//! never read back. Only addition is evaluated, so the multiplicative depth
//! configured here is headroom rather than budget.
//!
//! The backend only combines operands built on the same `BfvParameters`
//! instance, so every context of one parameter family in a process shares a
//! single instance; contexts still differ by [`ContextId`].
//!
//! Every context, key and ciphertext is stamped with the [`Fingerprint`] of
//! the [`CryptoParameters`] it was produced under. Operations refuse operands
//! whose fingerprint differs from the context's, so a parameter mix-up fails
//! instead of decrypting to a plausible wrong number.

use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use fhe::bfv::{self, BfvParameters, BfvParametersBuilder, Encoding, Plaintext};
use fhe_traits::{FheDecoder, FheDecrypter, FheEncoder, FheEncrypter};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::types::ScalarValue;

/// Mersenne prime 2^61 - 1.
pub const PLAINTEXT_MODULUS: u64 = (1 << 61) - 1;
pub const MODULUS_BITS: usize = 62;
pub const SEED_LEN: usize = 32;
pub const CONTEXT_ID_LEN: usize = 16;
pub(crate) const PARAMS_HEADER_LEN: usize = 5 * 4;

/// Bits of the centered plaintext range a whole aggregate may occupy.
const PLAINTEXT_RANGE_BITS: u32 = 60;
const FINGERPRINT_DOMAIN: &[u8] = b"encrypted-ledger/crypto-parameters/v1";

static SCHEMES: OnceLock<DashMap<CryptoParameters, Arc<BfvParameters>>> = OnceLock::new();

/// Process-wide backend parameters for `params`, built on first use.
fn shared_scheme(params: &CryptoParameters) -> Result<Arc<BfvParameters>, SchemeError> {
    let schemes = SCHEMES.get_or_init(DashMap::new);
    if let Some(scheme) = schemes.get(params) {
        return Ok(scheme.value().clone());
    }
    let built = params.build_scheme()?;
    let scheme = schemes.entry(*params).or_insert(built).value().clone();
    Ok(scheme)
}

#[derive(Debug, Error)]
pub enum SchemeError {
    #[error("invalid crypto parameters: {0}")]
    InvalidParameters(String),
    #[error("parameter fingerprint mismatch: expected {expected}, found {found}")]
    ParameterMismatch {
        expected: Fingerprint,
        found: Fingerprint,
    },
    #[error("value {value} is outside the encodable range of +/-{limit}")]
    ValueOutOfRange { value: f64, limit: f64 },
    #[error("value is not a finite number")]
    NonFiniteValue,
    #[error("cannot aggregate an empty set of ciphertexts")]
    EmptyAggregate,
    #[error("aggregating {count} ciphertexts exceeds the limit of {limit}")]
    AggregationLimit { count: usize, limit: usize },
    #[error("decrypted plaintext carries no slots")]
    EmptyPlaintext,
    #[error("scheme backend failure: {0}")]
    Backend(#[from] fhe::Error),
}

/// Immutable scheme configuration shared by every context in a deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CryptoParameters {
    /// Number of ciphertext moduli beyond the first.
    pub multiplicative_depth: u32,
    /// Fractional bits retained by the fixed-point packing.
    pub scaling_bits: u32,
    /// Populated plaintext slots; only slot 0 carries a value.
    pub batch_size: u32,
    pub ring_degree: u32,
    /// log2 of the number of ciphertexts one aggregate may fold.
    pub aggregation_headroom_bits: u32,
}

impl Default for CryptoParameters {
    fn default() -> Self {
        Self {
            multiplicative_depth: 1,
            scaling_bits: 24,
            batch_size: 8,
            ring_degree: 8192,
            aggregation_headroom_bits: 12,
        }
    }
}

impl CryptoParameters {
    pub fn with_ring_degree(mut self, ring_degree: u32) -> Self {
        self.ring_degree = ring_degree;
        self
    }

    pub fn validate(&self) -> Result<(), SchemeError> {
        if self.multiplicative_depth == 0 || self.multiplicative_depth > 8 {
            return Err(SchemeError::InvalidParameters(format!(
                "multiplicative depth must be within 1..=8, got {}",
                self.multiplicative_depth
            )));
        }
        if !self.ring_degree.is_power_of_two() || !(1024..=32768).contains(&self.ring_degree) {
            return Err(SchemeError::InvalidParameters(format!(
                "ring degree must be a power of two within 1024..=32768, got {}",
                self.ring_degree
            )));
        }
        if self.batch_size == 0 || self.batch_size > self.ring_degree {
            return Err(SchemeError::InvalidParameters(format!(
                "batch size must be within 1..={}, got {}",
                self.ring_degree, self.batch_size
            )));
        }
        if self.scaling_bits == 0
            || self.scaling_bits + self.aggregation_headroom_bits >= PLAINTEXT_RANGE_BITS
        {
            return Err(SchemeError::InvalidParameters(format!(
                "scaling bits ({}) plus aggregation headroom ({}) must stay below {}",
                self.scaling_bits, self.aggregation_headroom_bits, PLAINTEXT_RANGE_BITS
            )));
        }
        Ok(())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update(&self.to_header_bytes());
        hasher.update(&PLAINTEXT_MODULUS.to_le_bytes());
        hasher.update(&(MODULUS_BITS as u32).to_le_bytes());
        Fingerprint(*hasher.finalize().as_bytes())
    }

    pub fn scale(&self) -> f64 {
        2f64.powi(self.scaling_bits as i32)
    }

    /// Largest magnitude a single deposit may carry.
    pub fn max_abs_value(&self) -> f64 {
        self.max_scaled_magnitude() as f64 / self.scale()
    }

    /// Largest number of ciphertexts one aggregate may fold without wrapping.
    pub fn aggregation_limit(&self) -> usize {
        1usize << self.aggregation_headroom_bits
    }

    fn max_scaled_magnitude(&self) -> i64 {
        1i64 << (PLAINTEXT_RANGE_BITS - self.aggregation_headroom_bits)
    }

    pub(crate) fn to_header_bytes(&self) -> [u8; PARAMS_HEADER_LEN] {
        let mut out = [0u8; PARAMS_HEADER_LEN];
        let fields = [
            self.multiplicative_depth,
            self.scaling_bits,
            self.batch_size,
            self.ring_degree,
            self.aggregation_headroom_bits,
        ];
        for (chunk, field) in out.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        out
    }

    pub(crate) fn from_header_bytes(bytes: &[u8; PARAMS_HEADER_LEN]) -> Self {
        let mut fields = [0u32; 5];
        for (field, chunk) in fields.iter_mut().zip(bytes.chunks_exact(4)) {
            let mut word = [0u8; 4];
            word.copy_from_slice(chunk);
            *field = u32::from_le_bytes(word);
        }
        Self {
            multiplicative_depth: fields[0],
            scaling_bits: fields[1],
            batch_size: fields[2],
            ring_degree: fields[3],
            aggregation_headroom_bits: fields[4],
        }
    }

    fn build_scheme(&self) -> Result<Arc<BfvParameters>, SchemeError> {
        self.validate()?;
        let moduli = vec![MODULUS_BITS; self.multiplicative_depth as usize + 1];
        let scheme = BfvParametersBuilder::new()
            .set_degree(self.ring_degree as usize)
            .set_plaintext_modulus(PLAINTEXT_MODULUS)
            .set_moduli_sizes(&moduli)
            .build_arc()?;
        Ok(scheme)
    }

    fn quantize(&self, value: ScalarValue) -> Result<i64, SchemeError> {
        if !value.is_finite() {
            return Err(SchemeError::NonFiniteValue);
        }
        let scaled = (value * self.scale()).round();
        if scaled.abs() >= self.max_scaled_magnitude() as f64 {
            return Err(SchemeError::ValueOutOfRange {
                value,
                limit: self.max_abs_value(),
            });
        }
        Ok(scaled as i64)
    }
}

/// blake3 digest identifying a [`CryptoParameters`] family.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub [u8; CONTEXT_ID_LEN]);

impl ContextId {
    fn random() -> Self {
        let mut id = [0u8; CONTEXT_ID_LEN];
        rand::rng().fill_bytes(&mut id);
        Self(id)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({self})")
    }
}

/// Evaluation context bound to one parameter family. Required by every
/// encrypt, decrypt and add call; never mutated after creation.
#[derive(Clone)]
pub struct CryptoContext {
    id: ContextId,
    params: CryptoParameters,
    fingerprint: Fingerprint,
    scheme: Arc<BfvParameters>,
}

impl CryptoContext {
    pub fn generate(params: &CryptoParameters) -> Result<Self, SchemeError> {
        Self::restore(ContextId::random(), params)
    }

    /// Rebuilds the context identified by `id`. The header is validated before
    /// any backend tables are built for it.
    pub(crate) fn restore(id: ContextId, params: &CryptoParameters) -> Result<Self, SchemeError> {
        params.validate()?;
        Ok(Self {
            id,
            params: *params,
            fingerprint: params.fingerprint(),
            scheme: shared_scheme(params)?,
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn params(&self) -> &CryptoParameters {
        &self.params
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub(crate) fn scheme(&self) -> &Arc<BfvParameters> {
        &self.scheme
    }

    pub fn generate_key_pair(&self) -> KeyPair {
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        rand::rng().fill_bytes(&mut seed[..]);
        let secret = SecretKey::from_seed(self, seed);
        let public = PublicKey {
            fingerprint: self.fingerprint,
            inner: bfv::PublicKey::new(&secret.inner, &mut rand::rng()),
        };
        KeyPair { public, secret }
    }

    pub fn encrypt(
        &self,
        public: &PublicKey,
        value: ScalarValue,
    ) -> Result<Ciphertext, SchemeError> {
        self.check(public.fingerprint)?;
        let mut slots = vec![0i64; self.params.batch_size as usize];
        slots[0] = self.params.quantize(value)?;
        let plaintext = Plaintext::try_encode(slots.as_slice(), Encoding::poly(), &self.scheme)?;
        let inner = public.inner.try_encrypt(&plaintext, &mut rand::rng())?;
        Ok(Ciphertext {
            fingerprint: self.fingerprint,
            inner,
        })
    }

    pub fn decrypt(
        &self,
        secret: &SecretKey,
        ciphertext: &Ciphertext,
    ) -> Result<ScalarValue, SchemeError> {
        self.check(secret.fingerprint)?;
        self.check(ciphertext.fingerprint)?;
        let plaintext = secret.inner.try_decrypt(&ciphertext.inner)?;
        let slots = Vec::<i64>::try_decode(&plaintext, Encoding::poly())?;
        let first = slots.first().copied().ok_or(SchemeError::EmptyPlaintext)?;
        Ok(first as f64 / self.params.scale())
    }

    pub fn add(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext, SchemeError> {
        self.check(lhs.fingerprint)?;
        self.check(rhs.fingerprint)?;
        Ok(Ciphertext {
            fingerprint: self.fingerprint,
            inner: &lhs.inner + &rhs.inner,
        })
    }

    /// Left fold of `ciphertexts` starting from the first element.
    pub fn sum(&self, ciphertexts: &[Ciphertext]) -> Result<Ciphertext, SchemeError> {
        let limit = self.params.aggregation_limit();
        if ciphertexts.len() > limit {
            return Err(SchemeError::AggregationLimit {
                count: ciphertexts.len(),
                limit,
            });
        }
        let (first, rest) = ciphertexts
            .split_first()
            .ok_or(SchemeError::EmptyAggregate)?;
        self.check(first.fingerprint)?;
        let mut acc = first.inner.clone();
        for ct in rest {
            self.check(ct.fingerprint)?;
            acc += &ct.inner;
        }
        Ok(Ciphertext {
            fingerprint: self.fingerprint,
            inner: acc,
        })
    }

    fn check(&self, found: Fingerprint) -> Result<(), SchemeError> {
        if found != self.fingerprint {
            return Err(SchemeError::ParameterMismatch {
                expected: self.fingerprint,
                found,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for CryptoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoContext")
            .field("id", &self.id)
            .field("fingerprint", &self.fingerprint)
            .field("params", &self.params)
            .finish()
    }
}

pub struct PublicKey {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) inner: bfv::PublicKey,
}

impl PublicKey {
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Secret half of the key pair. Derived from a 32-byte seed, which is the only
/// material ever persisted; the seed is wiped on drop.
pub struct SecretKey {
    pub(crate) fingerprint: Fingerprint,
    seed: Zeroizing<[u8; SEED_LEN]>,
    inner: bfv::SecretKey,
}

impl SecretKey {
    pub(crate) fn from_seed(context: &CryptoContext, seed: Zeroizing<[u8; SEED_LEN]>) -> Self {
        let mut rng = ChaCha20Rng::from_seed(*seed);
        let inner = bfv::SecretKey::random(context.scheme(), &mut rng);
        Self {
            fingerprint: context.fingerprint,
            seed,
            inner,
        }
    }

    pub(crate) fn seed(&self) -> &[u8; SEED_LEN] {
        &self.seed
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("fingerprint", &self.fingerprint)
            .field("material", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
pub struct KeyPair {
    pub public: PublicKey,
    pub secret: SecretKey,
}

#[derive(Clone)]
pub struct Ciphertext {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) inner: bfv::Ciphertext,
}

impl Ciphertext {
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ciphertext")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}
