//! Cryptography: Ristretto keypairs, Schnorr signatures, the collective
//! signing oracle boundary and linkable ring signatures for attendee tokens.

pub mod cosign;
pub mod keys;
pub mod ring;
pub mod schnorr;

pub use cosign::{CollectiveSigning, CosignVerifier, LocalCosigner};
pub use keys::{KeyPair, PublicKey, SecretKey};
pub use ring::{RingSignature, Tag};
pub use schnorr::Signature;
