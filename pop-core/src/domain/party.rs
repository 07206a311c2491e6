use crate::domain::roster::Roster;
use crate::foundation::PartyId;
use serde::{Deserialize, Serialize};

/// Location and roster of a sibling party scheduled for a later merge. Kept
/// short on purpose: a full description here would recurse through the
/// sibling's own merge list and leave the party hash ill-defined.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortDesc {
    pub location: String,
    pub roster: Roster,
}

/// Immutable description of one party: what, when, where and which conodes
/// witness it, plus the optional list of sibling parties to merge with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopDesc {
    pub name: String,
    /// UTC, formatted `YYYY-MM-DD HH:MM`.
    pub date_time: String,
    pub location: String,
    pub roster: Roster,
    #[serde(default)]
    pub parties: Vec<ShortDesc>,
}

impl PopDesc {
    /// The party hash indexing this description on every server. Rosters
    /// enter through their aggregate key, so listing order does not matter.
    pub fn hash(&self) -> PartyId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"pop/party/v1");
        hasher.update(self.name.as_bytes());
        hasher.update(self.date_time.as_bytes());
        hasher.update(self.location.as_bytes());
        hasher.update(self.roster.aggregate().as_bytes());
        for party in &self.parties {
            hasher.update(party.location.as_bytes());
            hasher.update(party.roster.aggregate().as_bytes());
        }
        PartyId::new(*hasher.finalize().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::domain::roster::ServerIdentity;
    use uuid::Uuid;

    fn identity(i: usize) -> ServerIdentity {
        ServerIdentity {
            address: format!("tls://10.0.0.{}:7000", i + 1),
            public: KeyPair::generate().public,
            description: format!("conode-{}", i),
            id: Uuid::new_v4(),
        }
    }

    fn desc(roster: Roster) -> PopDesc {
        PopDesc {
            name: "32c3".to_string(),
            date_time: "2025-12-27 23:00".to_string(),
            location: "hamburg".to_string(),
            roster,
            parties: vec![],
        }
    }

    #[test]
    fn hash_is_stable_under_roster_reordering() {
        let a = identity(0);
        let b = identity(1);
        let c = identity(2);
        let forward = desc(Roster::new(vec![a.clone(), b.clone(), c.clone()]));
        let backward = desc(Roster::new(vec![c, a, b]));
        assert_eq!(forward.hash(), backward.hash());
    }

    #[test]
    fn hash_covers_every_field() {
        let roster = Roster::new(vec![identity(0), identity(1)]);
        let base = desc(roster.clone());

        let mut renamed = base.clone();
        renamed.name = "33c3".to_string();
        assert_ne!(base.hash(), renamed.hash());

        let mut moved = base.clone();
        moved.location = "leipzig".to_string();
        assert_ne!(base.hash(), moved.hash());

        let mut with_sibling = base.clone();
        with_sibling.parties.push(ShortDesc { location: "geneva".to_string(), roster });
        assert_ne!(base.hash(), with_sibling.hash());
    }
}
