use crate::crypto::{schnorr, PublicKey, Signature};
use crate::domain::party::{PopDesc, ShortDesc};
use crate::domain::roster::{Roster, ServerIdentity};
use crate::domain::status::PopStatus;
use crate::foundation::{Hash32, PartyId, PopError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// The signed transcript of one party: its description, the registered
/// attendee keys, the conodes' collective signature and the merged flag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalStatement {
    pub desc: PopDesc,
    pub attendees: Vec<PublicKey>,
    pub signature: Option<Signature>,
    pub merged: bool,
}

impl FinalStatement {
    /// A freshly registered, unsigned statement.
    pub fn new(desc: PopDesc) -> Self {
        Self { desc, attendees: Vec::new(), signature: None, merged: false }
    }

    /// Statement hash: party hash followed by the attendee keys in order.
    /// The signature is deliberately not part of the hash.
    pub fn hash(&self) -> Hash32 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"pop/statement/v1");
        hasher.update(self.desc.hash().as_ref());
        for attendee in &self.attendees {
            hasher.update(attendee.as_bytes());
        }
        *hasher.finalize().as_bytes()
    }

    pub fn is_finalized(&self) -> bool {
        self.signature.is_some()
    }

    /// Check the collective signature against the roster aggregate key.
    pub fn verify(&self) -> Result<()> {
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| PopError::Internal("statement is not signed yet".to_string()))?;
        schnorr::verify(&self.desc.roster.aggregate(), &self.hash(), signature)
    }

    /// Decide whether `other` may be folded into this party's merge.
    pub fn verify_merge_statement(&self, other: &FinalStatement) -> PopStatus {
        if self.verify().is_err() {
            warn!("merge check with invalid local signature party={}", self.desc.hash());
        }
        if !other.is_finalized() {
            return PopStatus::MergeNonFinalized;
        }
        if other.verify().is_err() {
            return PopStatus::MergeError;
        }
        if self.desc.date_time != other.desc.date_time {
            return PopStatus::MergeError;
        }
        let listed = self.desc.parties.iter().any(|party| party.roster.matches(&other.desc.roster));
        if !listed {
            return PopStatus::MergeError;
        }
        PopStatus::Ok
    }

    /// Canonical TOML encoding, fed to the collective-signing verifiers.
    pub fn to_toml(&self) -> Result<String> {
        let desc = PopDescToml {
            name: self.desc.name.clone(),
            date_time: self.desc.date_time.clone(),
            location: self.desc.location.clone(),
            roster: roster_to_rows(&self.desc.roster),
            parties: self
                .desc
                .parties
                .iter()
                .map(|party| ShortDescToml { location: party.location.clone(), roster: roster_to_rows(&party.roster) })
                .collect(),
        };
        let mirror = FinalStatementToml {
            attendees: self.attendees.iter().map(|key| key.canonical()).collect(),
            signature: self.signature.as_ref().map(|sig| hex::encode(sig.as_bytes())).unwrap_or_default(),
            merged: self.merged,
            desc,
        };
        Ok(toml::to_string(&mirror)?)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mirror: FinalStatementToml = toml::from_str(text)?;
        let desc = PopDesc {
            name: mirror.desc.name,
            date_time: mirror.desc.date_time,
            location: mirror.desc.location,
            roster: rows_to_roster(&mirror.desc.roster)?,
            parties: mirror
                .desc
                .parties
                .iter()
                .map(|party| Ok(ShortDesc { location: party.location.clone(), roster: rows_to_roster(&party.roster)? }))
                .collect::<Result<_>>()?,
        };
        let attendees = mirror
            .attendees
            .iter()
            .map(|encoded| PublicKey::from_bytes(&crate::foundation::parse_hex_32bytes(encoded)?))
            .collect::<Result<_>>()?;
        let signature = if mirror.signature.is_empty() {
            None
        } else {
            Some(Signature::from_bytes(&hex::decode(&mirror.signature)?)?)
        };
        Ok(Self { desc, attendees, signature, merged: mirror.merged })
    }
}

/// Merge bookkeeping for a party that lists sibling parties.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MergeMeta {
    /// Sibling party hash -> the final statement observed from that sibling.
    pub statements: HashMap<PartyId, FinalStatement>,
    /// Set once the merge broadcast has started; guards re-entry.
    pub distributing: bool,
}

impl MergeMeta {
    /// A party is always merged with itself.
    pub fn seeded(id: PartyId, statement: FinalStatement) -> Self {
        let mut statements = HashMap::new();
        statements.insert(id, statement);
        Self { statements, distributing: false }
    }
}

/// Intersection of two attendee lists, preserving the incoming list's order.
pub fn intersect_attendees(ours: &[PublicKey], incoming: &[PublicKey]) -> Vec<PublicKey> {
    let known: HashSet<&PublicKey> = ours.iter().collect();
    let mut seen = HashSet::new();
    incoming
        .iter()
        .filter(|key| known.contains(key) && seen.insert(**key))
        .copied()
        .collect()
}

/// Union of two attendee lists, deduplicated and sorted by canonical point
/// string for cross-server reproducibility.
pub fn union_attendees(ours: &[PublicKey], theirs: &[PublicKey]) -> Vec<PublicKey> {
    let mut merged: Vec<PublicKey> = Vec::with_capacity(ours.len() + theirs.len());
    let mut seen = HashSet::new();
    for key in ours.iter().chain(theirs) {
        if seen.insert(*key) {
            merged.push(*key);
        }
    }
    merged.sort_by_key(|key| key.canonical());
    merged
}

// TOML mirrors. Roster rows are [address, description, uuid, public-hex]
// string arrays so the encoding stays readable and diffable.

#[derive(Serialize, Deserialize)]
struct FinalStatementToml {
    attendees: Vec<String>,
    signature: String,
    merged: bool,
    desc: PopDescToml,
}

#[derive(Serialize, Deserialize)]
struct PopDescToml {
    name: String,
    date_time: String,
    location: String,
    roster: Vec<Vec<String>>,
    #[serde(default)]
    parties: Vec<ShortDescToml>,
}

#[derive(Serialize, Deserialize)]
struct ShortDescToml {
    location: String,
    roster: Vec<Vec<String>>,
}

fn roster_to_rows(roster: &Roster) -> Vec<Vec<String>> {
    roster
        .servers()
        .iter()
        .map(|server| {
            vec![server.address.clone(), server.description.clone(), server.id.to_string(), server.public.canonical()]
        })
        .collect()
}

fn rows_to_roster(rows: &[Vec<String>]) -> Result<Roster> {
    let servers = rows
        .iter()
        .map(|row| {
            let [address, description, id, public] = row.as_slice() else {
                return Err(PopError::Encoding(format!("roster row with {} fields, expected 4", row.len())));
            };
            Ok(ServerIdentity {
                address: address.clone(),
                description: description.clone(),
                id: Uuid::parse_str(id).map_err(|err| PopError::Encoding(format!("bad server uuid: {}", err)))?,
                public: PublicKey::from_bytes(&crate::foundation::parse_hex_32bytes(public)?)?,
            })
        })
        .collect::<Result<_>>()?;
    Ok(Roster::new(servers))
}
