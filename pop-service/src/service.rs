use crate::messages::{FetchRequest, FinalizeResponse, StoreConfig, StoreConfigReply};
use crate::sync::SyncMeta;
use log::{error, info, warn};
use pop_core::crypto::cosign::CosignVerifier;
use pop_core::crypto::{schnorr, CollectiveSigning, Signature};
use pop_core::domain::{FinalStatement, MergeMeta, ServerIdentity};
use pop_core::foundation::{PartyId, PopError, Result};
use pop_core::infrastructure::storage::{SaveData, ServiceStore};
use pop_core::infrastructure::transport::{Envelope, PeerMessage, Transport};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// One conode's view of the coordination protocol.
///
/// Persistent state lives in [`SaveData`] behind a mutex and is written back
/// through the store after every change; the lock is never held across an
/// await point. The per-party reply slots and latches are runtime-only.
pub struct Service {
    pub(crate) identity: ServerIdentity,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) cosigner: Arc<dyn CollectiveSigning>,
    store: ServiceStore,
    state: Mutex<SaveData>,
    sync_metas: Mutex<HashMap<PartyId, Arc<SyncMeta>>>,
}

impl Service {
    pub fn new(
        identity: ServerIdentity,
        transport: Arc<dyn Transport>,
        cosigner: Arc<dyn CollectiveSigning>,
        store: ServiceStore,
    ) -> Result<Arc<Self>> {
        let state = store.load()?;
        let sync_metas = state.parties.keys().map(|id| (*id, Arc::new(SyncMeta::default()))).collect();
        info!("service up server={} parties={}", identity.address, state.parties.len());
        Ok(Arc::new(Self {
            identity,
            transport,
            cosigner,
            store,
            state: Mutex::new(state),
            sync_metas: Mutex::new(sync_metas),
        }))
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Subscribe to the transport and spawn the dispatch loop. Every envelope
    /// is handled on its own task: a coordinator parked on a reply slot must
    /// never starve the handler that fills it.
    pub async fn start(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        let mut subscription = self.transport.subscribe().await?;
        let service = Arc::clone(self);
        Ok(tokio::spawn(async move {
            while let Some(incoming) = subscription.next().await {
                match incoming {
                    Ok(envelope) => {
                        let service = Arc::clone(&service);
                        tokio::spawn(async move { service.handle_envelope(envelope).await });
                    }
                    Err(err) => warn!("transport error: {}", err),
                }
            }
        }))
    }

    async fn handle_envelope(self: Arc<Self>, envelope: Envelope) {
        let Envelope { sender, message } = envelope;
        match message {
            PeerMessage::CheckConfig(msg) => self.handle_check_config(sender, msg).await,
            PeerMessage::CheckConfigReply(msg) => self.handle_check_config_reply(msg),
            PeerMessage::MergeConfig(msg) => self.handle_merge_config(sender, msg).await,
            PeerMessage::MergeConfigReply(msg) => self.handle_merge_config_reply(msg),
            PeerMessage::MergeCheck(msg) => self.handle_merge_check(sender, msg).await,
            PeerMessage::MergeCheckReply(msg) => self.handle_merge_check_reply(msg),
            PeerMessage::Propagate(statement) => self.handle_propagate(sender, statement).await,
            PeerMessage::PropagateReply(msg) => self.handle_propagate_reply(msg),
        }
    }

    // --- state access -----------------------------------------------------

    pub(crate) fn read_state<R>(&self, f: impl FnOnce(&SaveData) -> R) -> R {
        let guard = self.state.lock().expect("state lock");
        f(&guard)
    }

    /// Mutate the state and persist it. Persistence failures are logged, not
    /// propagated; the in-memory state stays authoritative for this process.
    pub(crate) fn update_state<R>(&self, f: impl FnOnce(&mut SaveData) -> R) -> R {
        let mut guard = self.state.lock().expect("state lock");
        let result = f(&mut guard);
        if let Err(err) = self.store.save(&guard) {
            error!("could not persist state: {}", err);
        }
        result
    }

    pub(crate) fn sync_meta(&self, id: &PartyId) -> Option<Arc<SyncMeta>> {
        self.sync_metas.lock().expect("sync metas lock").get(id).cloned()
    }

    pub(crate) fn ensure_sync_meta(&self, id: PartyId) -> Arc<SyncMeta> {
        let mut metas = self.sync_metas.lock().expect("sync metas lock");
        Arc::clone(metas.entry(id).or_default())
    }

    /// After a merge re-keys a party, the new hash shares the coordination
    /// channels of the old one.
    pub(crate) fn alias_sync_meta(&self, old: PartyId, new: PartyId) {
        let mut metas = self.sync_metas.lock().expect("sync metas lock");
        let meta = metas.get(&old).cloned().unwrap_or_default();
        metas.insert(new, meta);
    }

    /// Index `statement` under its party hash and refresh every key whose
    /// stored value carries that same hash. Keys created as aliases by
    /// [`Service::rekey_statement`] satisfy that and stay current; keys
    /// whose value still describes a different party are left alone.
    pub(crate) fn index_statement(data: &mut SaveData, statement: &FinalStatement) {
        let id = statement.desc.hash();
        for existing in data.parties.values_mut() {
            if existing.desc.hash() == id {
                *existing = statement.clone();
            }
        }
        data.parties.insert(id, statement.clone());
    }

    /// Re-key after a merge: store the merged statement under its merged
    /// hash and alias the pre-merge key to it, so fetches under the original
    /// hash keep serving the merged transcript. Once aliased, later
    /// [`Service::index_statement`] calls (signing, propagation) refresh the
    /// old key too.
    pub(crate) fn rekey_statement(data: &mut SaveData, old_id: PartyId, merged: &FinalStatement) {
        Self::index_statement(data, merged);
        data.parties.insert(old_id, merged.clone());
    }

    // --- organizer authentication ----------------------------------------

    pub(crate) fn verify_organizer(&self, message: &[u8], signature: &Signature) -> Result<()> {
        let organizer = self
            .read_state(|data| data.organizer)
            .ok_or_else(|| PopError::Internal("not linked yet".to_string()))?;
        schnorr::verify(&organizer, message, signature)
            .map_err(|err| PopError::Internal(format!("invalid signature: {}", err)))
    }

    /// The payload check this conode contributes to the collective-signing
    /// protocol; see [`Service::verify_collective`].
    pub fn cosign_verifier(self: &Arc<Self>) -> CosignVerifier {
        let service = Arc::clone(self);
        Arc::new(move |message, payload| service.verify_collective(message, payload))
    }

    // --- party store ------------------------------------------------------

    /// Register a party description. Idempotent: a statement that is already
    /// collectively signed is never overwritten.
    pub fn store_config(&self, req: StoreConfig) -> Result<StoreConfigReply> {
        if req.desc.roster.is_empty() {
            return Err(PopError::Internal("no roster set".to_string()));
        }
        let id = req.desc.hash();
        self.verify_organizer(id.as_ref(), &req.signature)?;
        info!("store config party={} server={}", id, self.identity.address);

        self.update_state(|data| {
            let keep = data.parties.get(&id).map(FinalStatement::is_finalized).unwrap_or(false);
            if !keep {
                let statement = FinalStatement::new(req.desc.clone());
                if !req.desc.parties.is_empty() {
                    // the party is merged with itself from the start
                    data.merge_metas.insert(id, MergeMeta::seeded(id, statement.clone()));
                }
                data.parties.insert(id, statement);
            }
        });
        self.ensure_sync_meta(id);
        Ok(StoreConfigReply { id })
    }

    /// Serve a finalized statement.
    pub fn fetch_final(&self, req: FetchRequest) -> Result<FinalizeResponse> {
        let statement = self
            .read_state(|data| data.parties.get(&req.id).cloned())
            .ok_or_else(|| PopError::Internal("no config found".to_string()))?;
        if !statement.is_finalized() {
            return Err(PopError::OtherFinalsPending("statement is not signed yet".to_string()));
        }
        Ok(FinalizeResponse { statement })
    }
}
