//! The PoP party coordination service.
//!
//! One [`Service`] instance runs per conode. It keeps per-party state keyed
//! by party hash, answers the organizer RPCs (link, store, finalize, fetch,
//! merge) and speaks the peer-to-peer reconciliation protocol with the other
//! conodes in each party's roster.

mod finalize;
mod link;
mod merge;
pub mod messages;
mod propagate;
mod service;
pub mod sync;

pub use service::Service;

use std::time::Duration;

/// Deadline applied to every suspension point: peer reply slots, the
/// collective-signing oracle and the merge acknowledgment latch.
pub const TIMEOUT: Duration = Duration::from_secs(60);

/// Separator used when joining sibling locations into the merged location.
pub const LOCATION_DELIMITER: &str = "; ";
