//! Linkable ring signatures for attendee tokens.
//!
//! An attendee signs a (message, context) pair against the ring of attendee
//! keys from a final statement. The signature carries a linkage tag
//! `tag = secret * HashToPoint(context)`: deterministic for one signer within
//! one context, unlinkable across contexts.

use crate::crypto::keys::{PublicKey, SecretKey};
use crate::foundation::{parse_hex_32bytes, PopError, Result};
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use std::fmt;

/// The linkage tag of a ring signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tag([u8; 32]);

impl Tag {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn canonical(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.canonical())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl Serialize for Tag {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.canonical())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Tag {
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
        Ok(Tag(bytes))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RingSignature {
    challenge: Scalar,
    responses: Vec<Scalar>,
    pub tag: Tag,
}

fn context_base(context: &[u8]) -> RistrettoPoint {
    let mut input = Vec::with_capacity(context.len() + 16);
    input.extend_from_slice(b"pop/ring/base/v1");
    input.extend_from_slice(context);
    RistrettoPoint::hash_from_bytes::<Sha512>(&input)
}

fn ring_challenge(
    message: &[u8],
    context: &[u8],
    ring: &[PublicKey],
    commit_base: &RistrettoPoint,
    commit_context: &RistrettoPoint,
) -> Scalar {
    let mut hash = Sha512::new();
    hash.update(b"pop/ring/challenge/v1");
    hash.update((message.len() as u64).to_le_bytes());
    hash.update(message);
    hash.update((context.len() as u64).to_le_bytes());
    hash.update(context);
    for member in ring {
        hash.update(member.as_bytes());
    }
    hash.update(commit_base.compress().as_bytes());
    hash.update(commit_context.compress().as_bytes());
    Scalar::from_hash(hash)
}

/// Produce a ring signature for `ring[index]` holding `secret`.
pub fn sign(message: &[u8], context: &[u8], ring: &[PublicKey], index: usize, secret: &SecretKey) -> Result<RingSignature> {
    if ring.is_empty() {
        return Err(PopError::Crypto { operation: "ring sign".to_string(), details: "empty ring".to_string() });
    }
    if index >= ring.len() || ring[index] != secret.public() {
        return Err(PopError::Crypto { operation: "ring sign".to_string(), details: "signer not at claimed ring position".to_string() });
    }

    let mut rng: OsRng = OsRng;
    let n = ring.len();
    let base = context_base(context);
    let tag_point = secret.0 * base;

    let mut challenges = vec![Scalar::ZERO; n];
    let mut responses = vec![Scalar::ZERO; n];

    let nonce = Scalar::random(&mut rng);
    challenges[(index + 1) % n] = ring_challenge(message, context, ring, &RistrettoPoint::mul_base(&nonce), &(nonce * base));

    let mut j = (index + 1) % n;
    while j != index {
        responses[j] = Scalar::random(&mut rng);
        let commit_base = RistrettoPoint::mul_base(&responses[j]) + challenges[j] * ring[j].point();
        let commit_context = responses[j] * base + challenges[j] * tag_point;
        challenges[(j + 1) % n] = ring_challenge(message, context, ring, &commit_base, &commit_context);
        j = (j + 1) % n;
    }
    responses[index] = nonce - challenges[index] * secret.0;

    Ok(RingSignature { challenge: challenges[0], responses, tag: Tag(tag_point.compress().to_bytes()) })
}

/// Check the signature against the ring and return the linkage tag.
pub fn verify(message: &[u8], context: &[u8], ring: &[PublicKey], signature: &RingSignature) -> Result<Tag> {
    let invalid = |details: &str| PopError::Crypto { operation: "ring verify".to_string(), details: details.to_string() };

    if ring.is_empty() || signature.responses.len() != ring.len() {
        return Err(invalid("ring and response lengths differ"));
    }
    let base = context_base(context);
    let tag_point = CompressedRistretto(*signature.tag.as_bytes()).decompress().ok_or_else(|| invalid("malformed tag"))?;

    let mut c = signature.challenge;
    for (member, response) in ring.iter().zip(&signature.responses) {
        let commit_base = RistrettoPoint::mul_base(response) + c * member.point();
        let commit_context = response * base + c * tag_point;
        c = ring_challenge(message, context, ring, &commit_base, &commit_context);
    }

    if c == signature.challenge {
        Ok(signature.tag)
    } else {
        Err(invalid("ring equation does not close"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;

    fn ring_of(pairs: &[KeyPair]) -> Vec<PublicKey> {
        pairs.iter().map(|p| p.public).collect()
    }

    #[test]
    fn sign_verify_roundtrip() {
        let pairs: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate()).collect();
        let ring = ring_of(&pairs);
        let sig = sign(b"msg", b"ctx", &ring, 2, &pairs[2].secret).expect("sign");
        let tag = verify(b"msg", b"ctx", &ring, &sig).expect("verify");
        assert_eq!(tag, sig.tag);
        assert!(verify(b"other", b"ctx", &ring, &sig).is_err());
        assert!(verify(b"msg", b"other-ctx", &ring, &sig).is_err());
    }

    #[test]
    fn tag_is_deterministic_per_signer_and_context() {
        let pairs: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
        let ring = ring_of(&pairs);
        let one = sign(b"first", b"service-a", &ring, 1, &pairs[1].secret).expect("sign");
        let two = sign(b"second", b"service-a", &ring, 1, &pairs[1].secret).expect("sign");
        assert_eq!(one.tag, two.tag);

        let elsewhere = sign(b"first", b"service-b", &ring, 1, &pairs[1].secret).expect("sign");
        assert_ne!(one.tag, elsewhere.tag);

        let other_signer = sign(b"first", b"service-a", &ring, 0, &pairs[0].secret).expect("sign");
        assert_ne!(one.tag, other_signer.tag);
    }

    #[test]
    fn rejects_wrong_position() {
        let pairs: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
        let ring = ring_of(&pairs);
        assert!(sign(b"msg", b"ctx", &ring, 0, &pairs[1].secret).is_err());
        assert!(sign(b"msg", b"ctx", &ring, 5, &pairs[1].secret).is_err());
    }
}
