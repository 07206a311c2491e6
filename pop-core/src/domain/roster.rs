use crate::crypto::PublicKey;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::traits::Identity;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One conode: reachable address, long-term public key, stable UUID and a
/// human description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerIdentity {
    pub address: String,
    pub public: PublicKey,
    pub description: String,
    pub id: Uuid,
}

impl ServerIdentity {
    /// Canonical string used wherever the protocol needs a stable
    /// cross-server ordering or deduplication key.
    pub fn canonical(&self) -> String {
        format!("{}/{}", self.address, self.public.canonical())
    }
}

/// Ordered list of conodes responsible for a party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    servers: Vec<ServerIdentity>,
}

impl Roster {
    pub fn new(servers: Vec<ServerIdentity>) -> Self {
        Self { servers }
    }

    pub fn servers(&self) -> &[ServerIdentity] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Sum of the member keys. Order-independent, which keeps the party hash
    /// stable across servers that list the roster differently.
    pub fn aggregate(&self) -> PublicKey {
        let point = self
            .servers
            .iter()
            .fold(RistrettoPoint::identity(), |sum, server| sum + server.public.point());
        PublicKey::from_point(point)
    }

    /// Set equality on members, compared by public key.
    pub fn matches(&self, other: &Roster) -> bool {
        if self.servers.len() != other.servers.len() {
            return false;
        }
        other
            .servers
            .iter()
            .all(|candidate| self.servers.iter().any(|member| member.public == candidate.public))
    }

    /// Union of two rosters, deduplicated and sorted by canonical identity
    /// string.
    pub fn union(&self, other: &Roster) -> Roster {
        let mut merged = self.servers.clone();
        for candidate in &other.servers {
            if !merged.iter().any(|member| member.canonical() == candidate.canonical()) {
                merged.push(candidate.clone());
            }
        }
        merged.sort_by_key(|member| member.canonical());
        Roster::new(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn identity(i: usize) -> ServerIdentity {
        ServerIdentity {
            address: format!("tls://10.0.0.{}:7000", i + 1),
            public: KeyPair::generate().public,
            description: format!("conode-{}", i),
            id: Uuid::new_v4(),
        }
    }

    #[test]
    fn aggregate_is_order_independent() {
        let a = identity(0);
        let b = identity(1);
        let c = identity(2);
        let forward = Roster::new(vec![a.clone(), b.clone(), c.clone()]);
        let backward = Roster::new(vec![c, b, a]);
        assert_eq!(forward.aggregate(), backward.aggregate());
    }

    #[test]
    fn matches_is_set_equality() {
        let a = identity(0);
        let b = identity(1);
        let forward = Roster::new(vec![a.clone(), b.clone()]);
        let backward = Roster::new(vec![b.clone(), a.clone()]);
        assert!(forward.matches(&backward));
        assert!(!forward.matches(&Roster::new(vec![a.clone()])));
        assert!(!forward.matches(&Roster::new(vec![a, identity(2)])));
    }

    #[test]
    fn union_dedups_and_sorts() {
        let a = identity(0);
        let b = identity(1);
        let c = identity(2);
        let left = Roster::new(vec![a.clone(), b.clone()]);
        let right = Roster::new(vec![b.clone(), c.clone()]);
        let merged = left.union(&right);
        assert_eq!(merged.len(), 3);
        let canonicals: Vec<String> = merged.servers().iter().map(|s| s.canonical()).collect();
        let mut sorted = canonicals.clone();
        sorted.sort();
        assert_eq!(canonicals, sorted);
    }
}
