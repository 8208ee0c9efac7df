//! Binary framing for contexts, keys and ciphertexts.
//!
//! Every object travels inside the same envelope:
//!
//! ```text
//! "ELG1" | version: u8 | kind: u8 | fingerprint: [u8; 32] | payload_len: u32 LE | payload
//! ```
//!
//! The fingerprint names the parameter family the payload was produced under.
//! Decoders compare it against the context they are handed before touching the
//! payload, so bytes from another family are refused rather than misread.
//! Transport text is standard base64 of the envelope.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use fhe::bfv;
use fhe_traits::{DeserializeParametrized, Serialize as FheSerialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::scheme::{
    Ciphertext, ContextId, CryptoContext, CryptoParameters, Fingerprint, PublicKey, SecretKey,
    CONTEXT_ID_LEN, PARAMS_HEADER_LEN, SEED_LEN,
};

const ENVELOPE_MAGIC: &[u8; 4] = b"ELG1";
const ENVELOPE_VERSION: u8 = 1;
const ENVELOPE_HEADER_LEN: usize = 4 + 1 + 1 + 32 + 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectKind {
    Context = 1,
    PublicKey = 2,
    SecretKey = 3,
    Ciphertext = 4,
}

impl ObjectKind {
    fn from_byte(byte: u8) -> Result<Self, CodecError> {
        match byte {
            1 => Ok(Self::Context),
            2 => Ok(Self::PublicKey),
            3 => Ok(Self::SecretKey),
            4 => Ok(Self::Ciphertext),
            other => Err(CodecError::UnknownKind(other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("envelope truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("envelope magic mismatch")]
    BadMagic,
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown object kind {0}")]
    UnknownKind(u8),
    #[error("expected {expected:?} envelope, found {found:?}")]
    KindMismatch {
        expected: ObjectKind,
        found: ObjectKind,
    },
    #[error("{0} trailing bytes after envelope payload")]
    TrailingBytes(usize),
    #[error("object fingerprint {found} does not match context fingerprint {expected}")]
    FingerprintMismatch {
        expected: Fingerprint,
        found: Fingerprint,
    },
    #[error("malformed payload: {0}")]
    Payload(String),
    #[error("invalid transport text: {0}")]
    TransportText(#[from] base64::DecodeError),
}

fn seal(kind: ObjectKind, fingerprint: Fingerprint, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ENVELOPE_HEADER_LEN + payload.len());
    out.extend_from_slice(ENVELOPE_MAGIC);
    out.push(ENVELOPE_VERSION);
    out.push(kind as u8);
    out.extend_from_slice(fingerprint.as_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn open(bytes: &[u8], expected: ObjectKind) -> Result<(Fingerprint, &[u8]), CodecError> {
    if bytes.len() < ENVELOPE_HEADER_LEN {
        return Err(CodecError::Truncated {
            needed: ENVELOPE_HEADER_LEN,
            available: bytes.len(),
        });
    }
    let mut cursor = 0usize;
    if &bytes[cursor..cursor + 4] != ENVELOPE_MAGIC {
        return Err(CodecError::BadMagic);
    }
    cursor += 4;
    if bytes[cursor] != ENVELOPE_VERSION {
        return Err(CodecError::UnsupportedVersion(bytes[cursor]));
    }
    cursor += 1;
    let found = ObjectKind::from_byte(bytes[cursor])?;
    if found != expected {
        return Err(CodecError::KindMismatch { expected, found });
    }
    cursor += 1;
    let mut fingerprint = [0u8; 32];
    fingerprint.copy_from_slice(&bytes[cursor..cursor + 32]);
    cursor += 32;
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[cursor..cursor + 4]);
    cursor += 4;
    let payload_len = u32::from_le_bytes(len_bytes) as usize;

    let rest = &bytes[cursor..];
    if rest.len() < payload_len {
        return Err(CodecError::Truncated {
            needed: ENVELOPE_HEADER_LEN + payload_len,
            available: bytes.len(),
        });
    }
    if rest.len() > payload_len {
        return Err(CodecError::TrailingBytes(rest.len() - payload_len));
    }
    Ok((Fingerprint(fingerprint), rest))
}

fn expect_fingerprint(expected: Fingerprint, found: Fingerprint) -> Result<(), CodecError> {
    if expected != found {
        return Err(CodecError::FingerprintMismatch { expected, found });
    }
    Ok(())
}

fn payload_error(err: impl std::fmt::Display) -> CodecError {
    CodecError::Payload(err.to_string())
}

pub fn encode_context(context: &CryptoContext) -> Vec<u8> {
    let scheme = context.scheme().to_bytes();
    let mut payload = Vec::with_capacity(PARAMS_HEADER_LEN + CONTEXT_ID_LEN + scheme.len());
    payload.extend_from_slice(&context.params().to_header_bytes());
    payload.extend_from_slice(&context.id().0);
    payload.extend_from_slice(&scheme);
    seal(ObjectKind::Context, context.fingerprint(), &payload)
}

pub fn decode_context(bytes: &[u8]) -> Result<CryptoContext, CodecError> {
    let (fingerprint, payload) = open(bytes, ObjectKind::Context)?;
    if payload.len() < PARAMS_HEADER_LEN + CONTEXT_ID_LEN {
        return Err(CodecError::Payload("context payload too short".into()));
    }
    let mut header = [0u8; PARAMS_HEADER_LEN];
    header.copy_from_slice(&payload[..PARAMS_HEADER_LEN]);
    let params = CryptoParameters::from_header_bytes(&header);
    expect_fingerprint(params.fingerprint(), fingerprint)?;

    let mut id = [0u8; CONTEXT_ID_LEN];
    id.copy_from_slice(&payload[PARAMS_HEADER_LEN..PARAMS_HEADER_LEN + CONTEXT_ID_LEN]);
    let context = CryptoContext::restore(ContextId(id), &params).map_err(payload_error)?;
    if context.scheme().to_bytes() != payload[PARAMS_HEADER_LEN + CONTEXT_ID_LEN..] {
        return Err(CodecError::Payload(
            "scheme parameters disagree with the context header".into(),
        ));
    }
    Ok(context)
}

pub fn encode_public_key(key: &PublicKey) -> Vec<u8> {
    seal(ObjectKind::PublicKey, key.fingerprint, &key.inner.to_bytes())
}

pub fn decode_public_key(context: &CryptoContext, bytes: &[u8]) -> Result<PublicKey, CodecError> {
    let (fingerprint, payload) = open(bytes, ObjectKind::PublicKey)?;
    expect_fingerprint(context.fingerprint(), fingerprint)?;
    let inner = bfv::PublicKey::from_bytes(payload, context.scheme()).map_err(payload_error)?;
    Ok(PublicKey { fingerprint, inner })
}

pub fn encode_secret_key(key: &SecretKey) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(seal(ObjectKind::SecretKey, key.fingerprint, key.seed()))
}

pub fn decode_secret_key(context: &CryptoContext, bytes: &[u8]) -> Result<SecretKey, CodecError> {
    let (fingerprint, payload) = open(bytes, ObjectKind::SecretKey)?;
    expect_fingerprint(context.fingerprint(), fingerprint)?;
    if payload.len() != SEED_LEN {
        return Err(CodecError::Payload(format!(
            "secret key seed must be {SEED_LEN} bytes, got {}",
            payload.len()
        )));
    }
    let mut seed = Zeroizing::new([0u8; SEED_LEN]);
    seed.copy_from_slice(payload);
    Ok(SecretKey::from_seed(context, seed))
}

pub fn encode_ciphertext(ciphertext: &Ciphertext) -> Vec<u8> {
    seal(
        ObjectKind::Ciphertext,
        ciphertext.fingerprint,
        &ciphertext.inner.to_bytes(),
    )
}

pub fn decode_ciphertext(context: &CryptoContext, bytes: &[u8]) -> Result<Ciphertext, CodecError> {
    let (fingerprint, payload) = open(bytes, ObjectKind::Ciphertext)?;
    expect_fingerprint(context.fingerprint(), fingerprint)?;
    let inner = bfv::Ciphertext::from_bytes(payload, context.scheme()).map_err(payload_error)?;
    Ok(Ciphertext { fingerprint, inner })
}

pub fn to_transport_text(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn from_transport_text(text: &str) -> Result<Vec<u8>, CodecError> {
    Ok(STANDARD.decode(text.trim())?)
}
