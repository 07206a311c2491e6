//! The addressed transport boundary between conodes.
//!
//! The real overlay lives outside this repository; the service only depends
//! on this trait. `mock` provides the in-memory hub used by tests and local
//! setups.

pub mod mock;

use crate::domain::{FinalStatement, PopStatus, ServerIdentity};
use crate::crypto::PublicKey;
use crate::foundation::{PartyId, Result};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

/// Ask a peer whether it holds the same party and prune attendees to the
/// common subset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckConfig {
    pub party: PartyId,
    pub attendees: Vec<PublicKey>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckConfigReply {
    pub status: PopStatus,
    pub party: PartyId,
    pub attendees: Vec<PublicKey>,
}

/// Offer this party's final statement to a sibling party and ask for its own
/// in return.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeConfig {
    pub statement: FinalStatement,
    /// Hash of the sibling party being contacted.
    pub target: PartyId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeConfigReply {
    pub status: PopStatus,
    /// Hash of the party that asked to merge.
    pub party: PartyId,
    pub statement: Option<FinalStatement>,
}

/// Distribute the collected sibling statements so every server folds the
/// same union.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeCheck {
    pub sender: PartyId,
    pub receiver: PartyId,
    pub statements: Vec<FinalStatement>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeCheckReply {
    pub party: PartyId,
    pub status: PopStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PropagateReply {
    pub party: PartyId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PeerMessage {
    CheckConfig(CheckConfig),
    CheckConfigReply(CheckConfigReply),
    MergeConfig(MergeConfig),
    MergeConfigReply(MergeConfigReply),
    MergeCheck(MergeCheck),
    MergeCheckReply(MergeCheckReply),
    Propagate(FinalStatement),
    PropagateReply(PropagateReply),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: ServerIdentity,
    pub message: PeerMessage,
}

pub struct TransportSubscription {
    inner: BoxStream<'static, Result<Envelope>>,
}

impl TransportSubscription {
    pub fn new(inner: BoxStream<'static, Result<Envelope>>) -> Self {
        Self { inner }
    }

    pub async fn next(&mut self) -> Option<Result<Envelope>> {
        self.inner.next().await
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one message to one peer. Sender identity is attached by the
    /// transport.
    async fn send(&self, target: &ServerIdentity, message: PeerMessage) -> Result<()>;

    /// Subscribe to the envelopes addressed to this transport's identity.
    async fn subscribe(&self) -> Result<TransportSubscription>;
}
