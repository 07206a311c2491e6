//! The finalization handshake: reconcile attendee lists with every peer in
//! the roster, then drive the collective signature and propagate the result.

use crate::messages::{FinalizeRequest, FinalizeResponse};
use crate::service::Service;
use crate::TIMEOUT;
use log::{debug, error, info};
use pop_core::domain::{intersect_attendees, FinalStatement, PopStatus, ServerIdentity};
use pop_core::foundation::{PartyId, PopError, Result};
use pop_core::infrastructure::transport::{CheckConfig, CheckConfigReply, PeerMessage};

impl Service {
    /// Finalize a party: push the attendee list, reconcile it with every
    /// other conode and collect the collective signature. Re-issuing the
    /// request on an already-signed party returns the existing statement.
    pub async fn finalize_request(&self, req: FinalizeRequest) -> Result<FinalizeResponse> {
        let message = FinalizeRequest::hash(&req.id, &req.attendees);
        self.verify_organizer(&message, &req.signature)?;
        info!("finalize party={} server={} attendees={}", req.id, self.identity.address, req.attendees.len());

        let statement = self
            .read_state(|data| data.parties.get(&req.id).cloned())
            .ok_or_else(|| PopError::Internal("no config found".to_string()))?;
        if statement.verify().is_ok() {
            info!("returning known final statement party={}", req.id);
            return Ok(FinalizeResponse { statement });
        }

        // Step 1: adopt the requested attendee list (deduplicated, order kept).
        let attendees = {
            let mut seen = std::collections::HashSet::new();
            req.attendees.iter().filter(|key| seen.insert(**key)).copied().collect::<Vec<_>>()
        };
        self.update_state(|data| {
            if let Some(statement) = data.parties.get_mut(&req.id) {
                statement.attendees = attendees.clone();
            }
        });

        // Step 2: ask every peer, in roster order, to prune against its list.
        let sync = self.ensure_sync_meta(req.id);
        let check = CheckConfig { party: req.id, attendees };
        for peer in statement.desc.roster.servers() {
            if peer.id == self.identity.id {
                continue;
            }
            debug!("check config to {} party={}", peer.address, req.id);
            self.transport
                .send(peer, PeerMessage::CheckConfig(check.clone()))
                .await
                .map_err(|err| PopError::Internal(err.to_string()))?;
            match sync.cc_slot.recv(TIMEOUT).await {
                Some(Some(_reply)) => {}
                Some(None) | None => {
                    return Err(PopError::OtherFinalsPending(format!("{} is not ready", peer.address)));
                }
            }
        }

        // Steps 3 and 4: collective signature, then roster-wide propagation.
        self.sign_and_propagate(req.id).await?;
        let statement = self
            .read_state(|data| data.parties.get(&req.id).cloned())
            .ok_or_else(|| PopError::Internal("statement vanished while signing".to_string()))?;
        Ok(FinalizeResponse { statement })
    }

    /// Hand the statement to the collective-signing oracle and broadcast the
    /// signed result to the whole roster.
    pub(crate) async fn sign_and_propagate(&self, id: PartyId) -> Result<()> {
        let statement = self
            .read_state(|data| data.parties.get(&id).cloned())
            .ok_or_else(|| PopError::Internal("no config found".to_string()))?;
        let message = statement.hash();
        let payload = statement.to_toml()?;
        let roster = statement.desc.roster.clone();

        info!("collective signing party={} roster={}", id, roster.len());
        let signature = tokio::time::timeout(TIMEOUT, self.cosigner.sign(&roster, &message, payload.as_bytes()))
            .await
            .map_err(|_| PopError::Timeout("signing timeout".to_string()))??;

        let mut signed = statement;
        signed.signature = Some(signature);
        self.update_state(|data| Service::index_statement(data, &signed));

        self.propagate_statement(&roster, signed).await
    }

    /// The check this conode runs inside the collective-signing protocol:
    /// the payload must decode to a statement whose hash is the message
    /// being signed, and the local statement for that party must agree.
    pub fn verify_collective(&self, message: &[u8], payload: &[u8]) -> bool {
        let text = match std::str::from_utf8(payload) {
            Ok(text) => text,
            Err(err) => {
                error!("cosign payload is not utf-8: {}", err);
                return false;
            }
        };
        let statement = match FinalStatement::from_toml(text) {
            Ok(statement) => statement,
            Err(err) => {
                error!("cosign payload does not decode: {}", err);
                return false;
            }
        };
        if statement.hash().as_slice() != message {
            error!("cosign payload hash differs from message");
            return false;
        }
        let local = self.read_state(|data| data.parties.get(&statement.desc.hash()).cloned());
        let Some(local) = local else {
            error!("no local statement for party={}", statement.desc.hash());
            return false;
        };
        if local.hash().as_slice() != message {
            error!("local statement hash differs from message party={}", statement.desc.hash());
            return false;
        }
        true
    }

    /// Peer side of step 2: prune the local attendee list to the
    /// intersection and report what is left.
    pub(crate) async fn handle_check_config(&self, sender: ServerIdentity, msg: CheckConfig) {
        let (status, attendees) = self.update_state(|data| match data.parties.get_mut(&msg.party) {
            None => (PopStatus::WrongHash, Vec::new()),
            Some(statement) => {
                statement.attendees = intersect_attendees(&statement.attendees, &msg.attendees);
                if statement.attendees.is_empty() {
                    (PopStatus::NoAttendees, Vec::new())
                } else {
                    (PopStatus::Ok, statement.attendees.clone())
                }
            }
        });
        debug!("check config party={} status={:?} common={}", msg.party, status, attendees.len());

        let reply = CheckConfigReply { status, party: msg.party, attendees };
        if let Err(err) = self.transport.send(&sender, PeerMessage::CheckConfigReply(reply)).await {
            error!("could not send check config reply: {}", err);
        }
    }

    /// Coordinator side of step 2: fold the peer's intersection into the
    /// local list and wake the waiting finalize call. A refusal wakes it
    /// with `None`.
    pub(crate) fn handle_check_config_reply(&self, msg: CheckConfigReply) {
        let delivered = self.update_state(|data| {
            let Some(statement) = data.parties.get_mut(&msg.party) else {
                error!("check config reply for unknown party={}", msg.party);
                return None;
            };
            if !msg.status.is_ok() {
                error!("peer refused check config party={} status={:?}", msg.party, msg.status);
                return None;
            }
            statement.attendees = intersect_attendees(&statement.attendees, &msg.attendees);
            Some(msg.clone())
        });
        match self.sync_meta(&msg.party) {
            Some(sync) => sync.cc_slot.deliver(delivered),
            None => error!("no sync meta for party={}", msg.party),
        }
    }
}
