//! Owner of the single global key pair.
//!
//! [`KeyCustodian::ensure_key_pair`] is the load-or-generate entry point. Both
//! key halves are persisted as independent blobs; if exactly one of them is
//! present, or either fails to decode, the custodian refuses to start rather
//! than regenerating and orphaning every ciphertext already stored.

use tracing::{info, warn};

use crate::codec;
use crate::error::LedgerError;
use crate::scheme::{Ciphertext, CryptoContext, CryptoParameters, PublicKey, SecretKey};
use crate::storage::{KeyBlobStore, PUBLIC_KEY_BLOB, SECRET_KEY_BLOB};
use crate::types::ScalarValue;

const PROBE_VALUE: ScalarValue = 1.5;
const PROBE_TOLERANCE: f64 = 1e-4;

pub struct KeyCustodian {
    context: CryptoContext,
    public: PublicKey,
    secret: SecretKey,
}

impl KeyCustodian {
    pub fn ensure_key_pair(
        store: &dyn KeyBlobStore,
        params: &CryptoParameters,
    ) -> Result<Self, LedgerError> {
        let context = CryptoContext::generate(params)?;
        let public = store
            .load(PUBLIC_KEY_BLOB)
            .map_err(|err| LedgerError::KeyLoad(format!("reading public key: {err}")))?;
        let secret = store
            .load(SECRET_KEY_BLOB)
            .map_err(|err| LedgerError::KeyLoad(format!("reading secret key: {err}")))?;

        let custodian = match (public, secret) {
            (None, None) => {
                let keys = context.generate_key_pair();
                store.store(SECRET_KEY_BLOB, &codec::encode_secret_key(&keys.secret))?;
                store.store(PUBLIC_KEY_BLOB, &codec::encode_public_key(&keys.public))?;
                info!(fingerprint = %context.fingerprint(), "generated and persisted new key pair");
                Self {
                    context,
                    public: keys.public,
                    secret: keys.secret,
                }
            }
            (Some(public), Some(secret)) => {
                let public = codec::decode_public_key(&context, &public)
                    .map_err(|err| LedgerError::KeyLoad(format!("public key blob: {err}")))?;
                let secret = codec::decode_secret_key(&context, &secret)
                    .map_err(|err| LedgerError::KeyLoad(format!("secret key blob: {err}")))?;
                let custodian = Self {
                    context,
                    public,
                    secret,
                };
                custodian.probe()?;
                info!(fingerprint = %custodian.context.fingerprint(), "loaded persisted key pair");
                custodian
            }
            (Some(_), None) => {
                warn!("public key present without secret key");
                return Err(LedgerError::KeyLoad(
                    "secret key blob is missing while the public key is present".into(),
                ));
            }
            (None, Some(_)) => {
                warn!("secret key present without public key");
                return Err(LedgerError::KeyLoad(
                    "public key blob is missing while the secret key is present".into(),
                ));
            }
        };
        Ok(custodian)
    }

    /// Encrypts and decrypts a known value to prove the two halves match.
    fn probe(&self) -> Result<(), LedgerError> {
        let mismatch = |detail: String| {
            LedgerError::KeyLoad(format!("persisted key halves do not match: {detail}"))
        };
        let ct = self
            .context
            .encrypt(&self.public, PROBE_VALUE)
            .map_err(|err| mismatch(err.to_string()))?;
        let back = self
            .context
            .decrypt(&self.secret, &ct)
            .map_err(|err| mismatch(err.to_string()))?;
        if (back - PROBE_VALUE).abs() > PROBE_TOLERANCE {
            return Err(mismatch(format!("probe decrypted to {back}")));
        }
        Ok(())
    }

    pub fn params(&self) -> &CryptoParameters {
        self.context.params()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn encrypt(
        &self,
        context: &CryptoContext,
        value: ScalarValue,
    ) -> Result<Ciphertext, LedgerError> {
        Ok(context.encrypt(&self.public, value)?)
    }

    pub fn decrypt(
        &self,
        context: &CryptoContext,
        ciphertext: &Ciphertext,
    ) -> Result<ScalarValue, LedgerError> {
        Ok(context.decrypt(&self.secret, ciphertext)?)
    }
}

impl std::fmt::Debug for KeyCustodian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCustodian")
            .field("fingerprint", &self.context.fingerprint())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKeyStore;

    fn params() -> CryptoParameters {
        CryptoParameters::default().with_ring_degree(2048)
    }

    #[test]
    fn generates_once_then_reloads() {
        let store = MemoryKeyStore::new();
        let first = KeyCustodian::ensure_key_pair(&store, &params()).unwrap();
        let ctx = CryptoContext::generate(&params()).unwrap();
        let ct = first.encrypt(&ctx, 250.75).unwrap();

        let second = KeyCustodian::ensure_key_pair(&store, &params()).unwrap();
        let value = second.decrypt(&ctx, &ct).unwrap();
        assert!((value - 250.75).abs() < 1e-4);
    }

    #[test]
    fn partial_material_is_a_load_error() {
        let store = MemoryKeyStore::new();
        KeyCustodian::ensure_key_pair(&store, &params()).unwrap();
        store.remove(SECRET_KEY_BLOB);
        let err = KeyCustodian::ensure_key_pair(&store, &params()).unwrap_err();
        assert!(matches!(err, LedgerError::KeyLoad(_)), "{err}");
        // Nothing was regenerated behind the caller's back.
        assert!(store.load(SECRET_KEY_BLOB).unwrap().is_none());
    }

    #[test]
    fn corrupt_blob_is_a_load_error() {
        let store = MemoryKeyStore::new();
        store.store(PUBLIC_KEY_BLOB, b"garbage").unwrap();
        store.store(SECRET_KEY_BLOB, b"garbage").unwrap();
        assert!(matches!(
            KeyCustodian::ensure_key_pair(&store, &params()),
            Err(LedgerError::KeyLoad(_))
        ));
    }

    #[test]
    fn keys_from_other_parameters_are_refused() {
        let store = MemoryKeyStore::new();
        KeyCustodian::ensure_key_pair(&store, &params()).unwrap();
        let mut other = params();
        other.scaling_bits = 20;
        assert!(matches!(
            KeyCustodian::ensure_key_pair(&store, &other),
            Err(LedgerError::KeyLoad(_))
        ));
    }

    #[test]
    fn debug_output_hides_keys() {
        let store = MemoryKeyStore::new();
        let custodian = KeyCustodian::ensure_key_pair(&store, &params()).unwrap();
        let rendered = format!("{custodian:?}");
        assert!(rendered.starts_with("KeyCustodian"));
        assert!(!rendered.contains("secret"));
    }
}
