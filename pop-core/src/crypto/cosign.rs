//! The byzantine collective-signing boundary.
//!
//! The coordination service never runs the BFT signing protocol itself; it
//! hands a (roster, message, payload) triple to a [`CollectiveSigning`]
//! implementation and expects back a signature that verifies under the
//! roster's aggregate key. Every roster member contributes a verifier that
//! inspects the payload before the member co-signs.

use crate::crypto::keys::{KeyPair, SecretKey};
use crate::crypto::schnorr::{self, Signature};
use crate::domain::roster::Roster;
use crate::foundation::{PopError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-member payload check invoked by the signing protocol: `(message,
/// payload) -> accept`.
pub type CosignVerifier = Arc<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync>;

#[async_trait]
pub trait CollectiveSigning: Send + Sync {
    async fn sign(&self, roster: &Roster, message: &[u8], payload: &[u8]) -> Result<Signature>;
}

struct Member {
    secret: SecretKey,
    verifier: CosignVerifier,
}

/// In-process stand-in for the external BFT signing service, used by tests
/// and local deployments. It consults every member's verifier and refuses to
/// sign unless all of them accept, then signs with the sum of the members'
/// secrets so the result verifies under the roster aggregate.
#[derive(Default)]
pub struct LocalCosigner {
    members: Mutex<HashMap<String, Member>>,
}

impl LocalCosigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pair: &KeyPair, verifier: CosignVerifier) {
        let mut members = self.members.lock().expect("cosigner lock");
        members.insert(pair.public.canonical(), Member { secret: pair.secret.clone(), verifier });
    }
}

#[async_trait]
impl CollectiveSigning for LocalCosigner {
    async fn sign(&self, roster: &Roster, message: &[u8], payload: &[u8]) -> Result<Signature> {
        let participants: Vec<(SecretKey, CosignVerifier)> = {
            let members = self.members.lock().expect("cosigner lock");
            roster
                .servers()
                .iter()
                .map(|server| {
                    members
                        .get(&server.public.canonical())
                        .map(|member| (member.secret.clone(), member.verifier.clone()))
                        .ok_or_else(|| PopError::Crypto {
                            operation: "collective sign".to_string(),
                            details: format!("no signer registered for {}", server.public),
                        })
                })
                .collect::<Result<_>>()?
        };

        for (_, verifier) in &participants {
            if !verifier(message, payload) {
                return Err(PopError::Crypto {
                    operation: "collective sign".to_string(),
                    details: "a roster member rejected the payload".to_string(),
                });
            }
        }

        let aggregate = KeyPair::aggregate_secret(participants.iter().map(|(secret, _)| secret));
        Ok(schnorr::sign(&aggregate, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::roster::{Roster, ServerIdentity};

    fn roster_of(pairs: &[KeyPair]) -> Roster {
        Roster::new(
            pairs
                .iter()
                .enumerate()
                .map(|(i, pair)| ServerIdentity {
                    address: format!("tls://10.0.0.{}:7000", i + 1),
                    public: pair.public,
                    description: format!("conode-{}", i),
                    id: uuid::Uuid::new_v4(),
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn signs_when_all_members_accept() {
        let pairs: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
        let roster = roster_of(&pairs);
        let cosigner = LocalCosigner::new();
        for pair in &pairs {
            cosigner.register(pair, Arc::new(|_, _| true));
        }

        let sig = cosigner.sign(&roster, b"message", b"payload").await.expect("sign");
        schnorr::verify(&roster.aggregate(), b"message", &sig).expect("aggregate verify");
    }

    #[tokio::test]
    async fn refuses_when_one_member_rejects() {
        let pairs: Vec<KeyPair> = (0..2).map(|_| KeyPair::generate()).collect();
        let roster = roster_of(&pairs);
        let cosigner = LocalCosigner::new();
        cosigner.register(&pairs[0], Arc::new(|_, _| true));
        cosigner.register(&pairs[1], Arc::new(|_, _| false));

        assert!(cosigner.sign(&roster, b"message", b"payload").await.is_err());
    }
}
