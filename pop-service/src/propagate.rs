//! Roster-wide distribution of a signed final statement.

use crate::service::Service;
use crate::TIMEOUT;
use log::{debug, error, warn};
use pop_core::domain::{FinalStatement, Roster, ServerIdentity};
use pop_core::foundation::{PopError, Result};
use pop_core::infrastructure::transport::{PeerMessage, PropagateReply};

impl Service {
    /// Deliver the signed statement to every server in the roster, self
    /// included, and wait for their acknowledgments. A shortfall is logged
    /// but not fatal: the collective signature already carries the quorum.
    pub(crate) async fn propagate_statement(&self, roster: &Roster, statement: FinalStatement) -> Result<()> {
        let id = statement.desc.hash();
        let sync = self.ensure_sync_meta(id);
        sync.propagate_latch.add(roster.len());

        for server in roster.servers() {
            self.transport
                .send(server, PeerMessage::Propagate(statement.clone()))
                .await
                .map_err(|err| PopError::Internal(err.to_string()))?;
        }

        if !sync.propagate_latch.wait(TIMEOUT).await {
            let missing = sync.propagate_latch.remaining();
            sync.propagate_latch.clear();
            warn!("propagation incomplete party={} missing={}", id, missing);
        }
        Ok(())
    }

    /// Store a propagated statement after checking its collective signature.
    pub(crate) async fn handle_propagate(&self, sender: ServerIdentity, statement: FinalStatement) {
        if let Err(err) = statement.verify() {
            error!("refusing propagated statement: {}", err);
            return;
        }
        let id = statement.desc.hash();
        self.update_state(|data| Service::index_statement(data, &statement));
        debug!("stored final statement party={} server={}", id, self.identity.address);

        if let Err(err) = self.transport.send(&sender, PeerMessage::PropagateReply(PropagateReply { party: id })).await {
            error!("could not acknowledge propagation: {}", err);
        }
    }

    pub(crate) fn handle_propagate_reply(&self, msg: PropagateReply) {
        match self.sync_meta(&msg.party) {
            Some(sync) => sync.propagate_latch.done(),
            None => error!("no sync meta for party={}", msg.party),
        }
    }
}
