use crate::foundation::{parse_hex_32bytes, PopError, Result};
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;

/// A public key on the Ristretto group. Keys aggregate by point addition,
/// which makes the roster aggregate independent of member order.
#[derive(Clone, Copy)]
pub struct PublicKey {
    point: RistrettoPoint,
    compressed: CompressedRistretto,
}

impl PublicKey {
    pub fn from_point(point: RistrettoPoint) -> Self {
        Self { point, compressed: point.compress() }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let compressed = CompressedRistretto(*bytes);
        let point = compressed
            .decompress()
            .ok_or_else(|| PopError::Crypto { operation: "decompress".to_string(), details: "invalid point encoding".to_string() })?;
        Ok(Self { point, compressed })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.compressed.as_bytes()
    }

    pub fn point(&self) -> &RistrettoPoint {
        &self.point
    }

    /// Canonical string form, used for deduplication and sorting wherever the
    /// protocol requires a stable cross-server order.
    pub fn canonical(&self) -> String {
        hex::encode(self.compressed.as_bytes())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.canonical())
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.compressed.as_bytes() == other.compressed.as_bytes()
    }
}

impl Eq for PublicKey {}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.compressed.as_bytes().hash(state);
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.compressed.as_bytes().cmp(other.compressed.as_bytes())
    }
}

impl Sum for PublicKey {
    fn sum<I: Iterator<Item = PublicKey>>(iter: I) -> Self {
        let point: RistrettoPoint = iter.map(|key| key.point).sum();
        PublicKey::from_point(point)
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.canonical())
        } else {
            self.compressed.as_bytes().serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            parse_hex_32bytes(&s).map_err(serde::de::Error::custom)?
        } else {
            <[u8; 32]>::deserialize(deserializer)?
        };
        PublicKey::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// A long-term private scalar. Kept opaque; signing goes through
/// [`crate::crypto::schnorr`] or [`crate::crypto::ring`].
#[derive(Clone)]
pub struct SecretKey(pub(crate) Scalar);

impl SecretKey {
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public(&self) -> PublicKey {
        PublicKey::from_point(RistrettoPoint::mul_base(&self.0))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public: PublicKey,
    pub secret: SecretKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let mut rng: OsRng = OsRng;
        let secret = SecretKey(Scalar::random(&mut rng));
        let public = secret.public();
        Self { public, secret }
    }

    /// Sum of several secrets; its public key is the sum of the members'
    /// public keys. Used by the in-process collective signer.
    pub fn aggregate_secret<'a>(secrets: impl Iterator<Item = &'a SecretKey>) -> SecretKey {
        SecretKey(secrets.map(|s| s.0).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_roundtrips_through_bytes() {
        let pair = KeyPair::generate();
        let restored = PublicKey::from_bytes(pair.public.as_bytes()).expect("decode");
        assert_eq!(restored, pair.public);
        assert_eq!(restored.canonical(), pair.public.canonical());
    }

    #[test]
    fn aggregate_secret_matches_summed_publics() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let aggregate = KeyPair::aggregate_secret([&a.secret, &b.secret].into_iter());
        let summed: PublicKey = [a.public, b.public].into_iter().sum();
        assert_eq!(aggregate.public(), summed);
    }

    #[test]
    fn serde_human_readable_is_hex() {
        let pair = KeyPair::generate();
        let encoded = toml::to_string(&std::collections::BTreeMap::from([("key", pair.public)])).expect("toml");
        assert!(encoded.contains(&pair.public.canonical()));
    }
}
