//! Schnorr signatures over Ristretto, with the Sha512 challenge fed through
//! `Scalar::from_hash`. The same verification equation covers organizer
//! signatures (single key) and collective signatures (aggregate key).

use crate::crypto::keys::{PublicKey, SecretKey};
use crate::foundation::{PopError, Result};
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use std::fmt;

pub const SIGNATURE_LENGTH: usize = 64;

/// A 64-byte Schnorr signature: compressed nonce point R followed by the
/// response scalar s.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; SIGNATURE_LENGTH] = bytes
            .try_into()
            .map_err(|_| PopError::Encoding(format!("expected {} signature bytes, got {}", SIGNATURE_LENGTH, bytes.len())))?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(self.0))
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
            Signature::from_bytes(&bytes).map_err(serde::de::Error::custom)
        } else {
            let bytes = Vec::<u8>::deserialize(deserializer)?;
            Signature::from_bytes(&bytes).map_err(serde::de::Error::custom)
        }
    }
}

fn challenge(nonce_point: &CompressedRistretto, public: &PublicKey, message: &[u8]) -> Scalar {
    let mut hash = Sha512::new();
    hash.update(b"pop/schnorr/v1");
    hash.update(nonce_point.as_bytes());
    hash.update(public.as_bytes());
    hash.update(message);
    Scalar::from_hash(hash)
}

/// Sign `message` with a deterministic nonce derived from the secret and the
/// message, in the manner of EdDSA.
pub fn sign(secret: &SecretKey, message: &[u8]) -> Signature {
    let mut nonce_hash = Sha512::new();
    nonce_hash.update(b"pop/schnorr/nonce/v1");
    nonce_hash.update(secret.to_bytes());
    nonce_hash.update(message);
    let nonce = Scalar::from_hash(nonce_hash);

    let nonce_point = RistrettoPoint::mul_base(&nonce).compress();
    let public = secret.public();
    let c = challenge(&nonce_point, &public, message);
    let s = nonce + c * secret.0;

    let mut bytes = [0u8; SIGNATURE_LENGTH];
    bytes[..32].copy_from_slice(nonce_point.as_bytes());
    bytes[32..].copy_from_slice(&s.to_bytes());
    Signature(bytes)
}

pub fn verify(public: &PublicKey, message: &[u8], signature: &Signature) -> Result<()> {
    let invalid = |details: &str| PopError::Crypto { operation: "schnorr verify".to_string(), details: details.to_string() };

    let mut nonce_bytes = [0u8; 32];
    nonce_bytes.copy_from_slice(&signature.0[..32]);
    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&signature.0[32..]);

    let nonce_compressed = CompressedRistretto(nonce_bytes);
    let nonce_point = nonce_compressed.decompress().ok_or_else(|| invalid("malformed nonce point"))?;
    let s: Scalar = Option::from(Scalar::from_canonical_bytes(s_bytes)).ok_or_else(|| invalid("malformed response scalar"))?;

    let c = challenge(&nonce_compressed, public, message);
    if RistrettoPoint::mul_base(&s) == nonce_point + c * public.point() {
        Ok(())
    } else {
        Err(invalid("signature does not verify"))
    }
}
