//! The inter-party merge: collect every sibling's final statement, ship the
//! bundle to every server of every sibling, fold the union locally and
//! re-key the party under its merged hash.

use crate::messages::{FinalizeResponse, MergeRequest};
use crate::service::Service;
use crate::{LOCATION_DELIMITER, TIMEOUT};
use log::{debug, error, info};
use pop_core::domain::{union_attendees, FinalStatement, MergeMeta, PopDesc, PopStatus, Roster, ServerIdentity};
use pop_core::foundation::{PartyId, PopError, Result};
use pop_core::infrastructure::transport::{MergeCheck, MergeCheckReply, MergeConfig, MergeConfigReply, PeerMessage};
use std::collections::HashMap;

impl Service {
    /// Merge this party with its siblings. Requires a finalized statement
    /// whose description lists at least two parties, one of them this one.
    /// A party that is already merged returns its statement unchanged.
    pub async fn merge_request(&self, req: MergeRequest) -> Result<FinalizeResponse> {
        self.verify_organizer(req.id.as_ref(), &req.signature)?;
        info!("merge party={} server={}", req.id, self.identity.address);

        let statement = self
            .read_state(|data| data.parties.get(&req.id).cloned())
            .ok_or_else(|| PopError::Internal("no config found".to_string()))?;
        let has_meta = self.read_state(|data| data.merge_metas.contains_key(&req.id));
        if !has_meta {
            return Err(PopError::Internal("no merge meta found".to_string()));
        }
        if statement.verify().is_err() {
            return Err(PopError::OtherFinalsPending("party is not finalized yet".to_string()));
        }
        if statement.desc.parties.len() <= 1 {
            return Err(PopError::Internal("party is unmergeable".to_string()));
        }
        if statement.merged {
            return Ok(FinalizeResponse { statement });
        }
        let listed = statement.desc.parties.iter().any(|party| party.roster.matches(&statement.desc.roster));
        if !listed {
            return Err(PopError::Internal("party is not included in merge list".to_string()));
        }

        match self.merge(req.id).await? {
            Some(merged_id) => {
                self.sign_and_propagate(merged_id).await?;
                let statement = self
                    .read_state(|data| data.parties.get(&merged_id).cloned())
                    .ok_or_else(|| PopError::Internal("merged statement vanished".to_string()))?;
                Ok(FinalizeResponse { statement })
            }
            // another merge already runs; report whatever we have
            None => {
                let statement = self
                    .read_state(|data| data.parties.get(&req.id).cloned())
                    .ok_or_else(|| PopError::Internal("no config found".to_string()))?;
                Ok(FinalizeResponse { statement })
            }
        }
    }

    /// The coordinator's merge rounds. Returns the merged party hash, or
    /// `None` when a concurrent merge holds the `distributing` guard.
    async fn merge(&self, id: PartyId) -> Result<Option<PartyId>> {
        let sync = self.ensure_sync_meta(id);

        let proceed = self.update_state(|data| {
            let current = data.parties.get(&id).cloned();
            let Some(meta) = data.merge_metas.get_mut(&id) else {
                return Err(PopError::Merge("no merge meta found".to_string()));
            };
            if meta.distributing {
                return Ok(false);
            }
            meta.distributing = true;
            // refresh the self entry: it was seeded before finalization
            if let Some(statement) = current {
                meta.statements.insert(id, statement);
            }
            Ok(true)
        })?;
        if !proceed {
            info!("merge already distributing party={}", id);
            return Ok(None);
        }

        let statement = self
            .read_state(|data| data.parties.get(&id).cloned())
            .ok_or_else(|| PopError::Merge("no config found".to_string()))?;

        // One round per sibling that is not folded in yet: ask its servers,
        // in roster order, until one hands over the sibling's statement.
        for party in &statement.desc.parties {
            let sibling = Self::probe_hash(&statement.desc, party.location.clone(), party.roster.clone());
            let known = self.read_state(|data| {
                data.merge_metas.get(&id).map(|meta| meta.statements.contains_key(&sibling)).unwrap_or(false)
            });
            if known {
                continue;
            }

            let offer = PeerMessage::MergeConfig(MergeConfig { statement: statement.clone(), target: sibling });
            let mut recorded = false;
            for server in party.roster.servers() {
                debug!("merge config from {} to {}", self.identity.address, server.address);
                self.transport.send(server, offer.clone()).await.map_err(|err| PopError::Internal(err.to_string()))?;

                let reply = match sync.mc_slot.recv(TIMEOUT).await {
                    None => return Err(PopError::Timeout("no merge config reply".to_string())),
                    Some(None) => return Err(PopError::Merge("error during merging".to_string())),
                    Some(Some(reply)) => reply,
                };
                if reply.status == PopStatus::Ok {
                    if let Some(theirs) = reply.statement {
                        self.update_state(|data| {
                            if let Some(meta) = data.merge_metas.get_mut(&id) {
                                meta.statements.insert(sibling, theirs);
                            }
                        });
                        recorded = true;
                        break;
                    }
                }
            }
            if !recorded {
                return Err(PopError::Merge("merge with party failed".to_string()));
            }
        }

        self.broadcast_merged(&statement, &sync).await?;

        // Fold the union locally and re-key under the merged hash.
        let merged_id = self.update_state(|data| {
            let collected: Vec<FinalStatement> =
                data.merge_metas.get(&id).map(|meta| meta.statements.values().cloned().collect()).unwrap_or_default();
            let Some(current) = data.parties.get(&id).cloned() else {
                return Err(PopError::Merge("no config found".to_string()));
            };
            let merged = Self::fold_union(current, &collected);
            let merged_id = merged.desc.hash();
            Service::rekey_statement(data, id, &merged);
            let meta = MergeMeta {
                statements: HashMap::from([(merged_id, merged)]),
                distributing: true,
            };
            data.merge_metas.insert(id, meta.clone());
            data.merge_metas.insert(merged_id, meta);
            Ok(merged_id)
        })?;
        self.alias_sync_meta(id, merged_id);
        Ok(Some(merged_id))
    }

    /// Ship the collected bundle to every server of every sibling and wait
    /// for one acknowledgment per recipient.
    async fn broadcast_merged(&self, statement: &FinalStatement, sync: &crate::sync::SyncMeta) -> Result<()> {
        let own = statement.desc.hash();
        let bundle: Vec<FinalStatement> = self.read_state(|data| {
            data.merge_metas.get(&own).map(|meta| meta.statements.values().cloned().collect()).unwrap_or_default()
        });

        let recipients: usize = statement.desc.parties.iter().map(|party| party.roster.len()).sum();
        sync.ack_latch.add(recipients.saturating_sub(1));

        for party in &statement.desc.parties {
            let receiver = Self::probe_hash(&statement.desc, party.location.clone(), party.roster.clone());
            let message = PeerMessage::MergeCheck(MergeCheck { sender: own, receiver, statements: bundle.clone() });
            for server in party.roster.servers() {
                if server.id == self.identity.id && receiver == own {
                    continue;
                }
                self.transport.send(server, message.clone()).await.map_err(|err| PopError::Internal(err.to_string()))?;
            }
        }

        if !sync.ack_latch.wait(TIMEOUT).await {
            let missing = sync.ack_latch.remaining();
            sync.ack_latch.clear();
            return Err(PopError::Timeout(format!("{} merge acknowledgments missing", missing)));
        }
        Ok(())
    }

    /// A sibling's party hash: this party's name, datetime and merge list
    /// with the sibling's location and roster swapped in.
    fn probe_hash(desc: &PopDesc, location: String, roster: Roster) -> PartyId {
        PopDesc {
            name: desc.name.clone(),
            date_time: desc.date_time.clone(),
            location,
            roster,
            parties: desc.parties.clone(),
        }
        .hash()
    }

    /// Union semantics of the merged transcript: attendees deduplicated and
    /// sorted by canonical point string, roster deduplicated and sorted by
    /// canonical identity string, location the sorted join of the sibling
    /// locations. The old collective signature is void after the mutation.
    pub(crate) fn fold_union(mut statement: FinalStatement, others: &[FinalStatement]) -> FinalStatement {
        let mut locations = Vec::with_capacity(others.len());
        for other in others {
            statement.attendees = union_attendees(&statement.attendees, &other.attendees);
            statement.desc.roster = statement.desc.roster.union(&other.desc.roster);
            locations.push(other.desc.location.clone());
        }
        locations.sort();
        statement.desc.location = locations.join(LOCATION_DELIMITER);
        statement.merged = true;
        statement.signature = None;
        statement
    }

    /// Peer side of the collection round: verify the requester's statement,
    /// record it, and hand back our own. A repeated offer for a party that
    /// is already folded in is refused with `MergeError`.
    pub(crate) async fn handle_merge_config(&self, sender: ServerIdentity, msg: MergeConfig) {
        let requester = msg.statement.desc.hash();
        debug!("merge config from {} for party={}", sender.address, msg.target);

        let (status, local) = self.update_state(|data| {
            let Some(local) = data.parties.get(&msg.target).cloned() else {
                error!("merge config for unknown party={}", msg.target);
                return (PopStatus::WrongHash, None);
            };
            let Some(meta) = data.merge_metas.get_mut(&msg.target) else {
                error!("no merge meta for party={}", msg.target);
                return (PopStatus::WrongHash, None);
            };
            let status = local.verify_merge_statement(&msg.statement);
            if !status.is_ok() {
                return (status, None);
            }
            if meta.statements.contains_key(&requester) {
                info!("party={} was already merged with {}", msg.target, requester);
                return (PopStatus::MergeError, None);
            }
            meta.statements.insert(requester, msg.statement.clone());
            (PopStatus::Ok, Some(local))
        });

        let reply = MergeConfigReply { status, party: requester, statement: local };
        if let Err(err) = self.transport.send(&sender, PeerMessage::MergeConfigReply(reply)).await {
            error!("could not send merge config reply: {}", err);
        }
    }

    /// Coordinator side of the collection round: re-verify the attached
    /// statement before waking the waiting merge call.
    pub(crate) fn handle_merge_config_reply(&self, msg: MergeConfigReply) {
        let delivered = self.read_state(|data| {
            let Some(local) = data.parties.get(&msg.party) else {
                error!("merge config reply for unknown party={}", msg.party);
                return None;
            };
            if !msg.status.is_ok() {
                error!("peer refused merge config party={} status={:?}", msg.party, msg.status);
                return Some(msg.clone());
            }
            let Some(theirs) = &msg.statement else {
                error!("empty statement in merge config reply party={}", msg.party);
                return None;
            };
            let mut verified = msg.clone();
            verified.status = local.verify_merge_statement(theirs);
            Some(verified)
        });
        match self.sync_meta(&msg.party) {
            Some(sync) => sync.mc_slot.deliver(delivered),
            None => error!("no sync meta for party={}", msg.party),
        }
    }

    /// Recipient side of the broadcast: check that our own statement is part
    /// of the bundle and that every entry is mergeable, then fold the union
    /// and re-key.
    pub(crate) async fn handle_merge_check(&self, sender: ServerIdentity, msg: MergeCheck) {
        debug!("merge check from {} for party={}", sender.address, msg.receiver);

        let (status, rekeyed) = self.update_state(|data| {
            let Some(local) = data.parties.get(&msg.receiver).cloned() else {
                error!("merge check for unknown party={}", msg.receiver);
                return (PopStatus::WrongHash, None);
            };
            if !data.merge_metas.contains_key(&msg.receiver) {
                error!("no merge meta for party={}", msg.receiver);
                return (PopStatus::WrongHash, None);
            }

            let local_hash = local.hash();
            let mut found = false;
            for statement in &msg.statements {
                if statement.hash() == local_hash {
                    found = true;
                }
                if !local.verify_merge_statement(statement).is_ok() {
                    error!("merge check carries a non-mergeable statement party={}", msg.receiver);
                    return (PopStatus::MergeError, None);
                }
            }
            if !found {
                error!("local party is missing from the merge bundle party={}", msg.receiver);
                return (PopStatus::MergeError, None);
            }

            let merged = Self::fold_union(local, &msg.statements);
            let merged_id = merged.desc.hash();
            Service::rekey_statement(data, msg.receiver, &merged);
            let distributing = data.merge_metas.get(&msg.receiver).map(|meta| meta.distributing).unwrap_or(false);
            let meta = MergeMeta { statements: HashMap::from([(merged_id, merged)]), distributing };
            data.merge_metas.insert(msg.receiver, meta.clone());
            data.merge_metas.insert(merged_id, meta);
            (PopStatus::Ok, Some(merged_id))
        });

        if let Some(merged_id) = rekeyed {
            self.ensure_sync_meta(msg.receiver);
            self.alias_sync_meta(msg.receiver, merged_id);
        }

        let reply = MergeCheckReply { party: msg.sender, status };
        if let Err(err) = self.transport.send(&sender, PeerMessage::MergeCheckReply(reply)).await {
            error!("could not send merge check reply: {}", err);
        }
    }

    /// One acknowledgment for the broadcast latch. The counter drops even on
    /// a refusal so the coordinator does not hang on a misbehaving peer.
    pub(crate) fn handle_merge_check_reply(&self, msg: MergeCheckReply) {
        if !msg.status.is_ok() {
            error!("merge check refused party={} status={:?}", msg.party, msg.status);
        }
        match self.sync_meta(&msg.party) {
            Some(sync) => sync.ack_latch.done(),
            None => error!("no sync meta for party={}", msg.party),
        }
    }
}
