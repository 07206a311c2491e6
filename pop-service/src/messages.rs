//! Organizer-facing RPC messages. The RPC glue itself (framing, endpoints)
//! lives outside this crate; these are the request/response payloads.

use pop_core::crypto::{PublicKey, Signature};
use pop_core::domain::{FinalStatement, PopDesc};
use pop_core::foundation::{Hash32, PartyId};
use serde::{Deserialize, Serialize};

/// Link an organizer to this conode. An empty pin asks the conode to mint
/// one and print it on its operator channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PinRequest {
    pub pin: String,
    pub public: PublicKey,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    pub desc: PopDesc,
    /// Organizer signature over the party hash.
    pub signature: Signature,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfigReply {
    pub id: PartyId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub id: PartyId,
    pub attendees: Vec<PublicKey>,
    /// Organizer signature over [`FinalizeRequest::hash`].
    pub signature: Signature,
}

impl FinalizeRequest {
    /// What the organizer signs: the party hash followed by the attendee
    /// keys in order.
    pub fn hash(id: &PartyId, attendees: &[PublicKey]) -> Hash32 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"pop/finalize/v1");
        hasher.update(id.as_ref());
        for attendee in attendees {
            hasher.update(attendee.as_bytes());
        }
        *hasher.finalize().as_bytes()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchRequest {
    pub id: PartyId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeRequest {
    pub id: PartyId,
    /// Organizer signature over the party hash.
    pub signature: Signature,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FinalizeResponse {
    pub statement: FinalStatement,
}
