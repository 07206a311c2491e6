//! In-memory transport used by tests and single-process deployments.

use crate::domain::ServerIdentity;
use crate::foundation::{PopError, Result};
use crate::infrastructure::transport::{Envelope, PeerMessage, Transport, TransportSubscription};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};

const MAILBOX_DEPTH: usize = 256;

/// Routes envelopes between the transports registered on it, keyed by the
/// canonical identity string.
#[derive(Default)]
pub struct MockHub {
    mailboxes: Mutex<HashMap<String, mpsc::Sender<Envelope>>>,
}

impl MockHub {
    pub fn new() -> Self {
        Self::default()
    }

    async fn register(&self, identity: &ServerIdentity) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(MAILBOX_DEPTH);
        self.mailboxes.lock().await.insert(identity.canonical(), tx);
        rx
    }

    async fn deliver(&self, target: &ServerIdentity, envelope: Envelope) -> Result<()> {
        let mailbox = {
            let mailboxes = self.mailboxes.lock().await;
            mailboxes.get(&target.canonical()).cloned()
        };
        let mailbox = mailbox.ok_or_else(|| PopError::Transport {
            operation: "send".to_string(),
            details: format!("no route to {}", target.address),
        })?;
        mailbox
            .send(envelope)
            .await
            .map_err(|_| PopError::Transport { operation: "send".to_string(), details: format!("{} is gone", target.address) })
    }
}

pub struct MockTransport {
    hub: std::sync::Arc<MockHub>,
    identity: ServerIdentity,
}

impl MockTransport {
    pub fn new(hub: std::sync::Arc<MockHub>, identity: ServerIdentity) -> Self {
        Self { hub, identity }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, target: &ServerIdentity, message: PeerMessage) -> Result<()> {
        let envelope = Envelope { sender: self.identity.clone(), message };
        self.hub.deliver(target, envelope).await
    }

    async fn subscribe(&self) -> Result<TransportSubscription> {
        let receiver = self.hub.register(&self.identity).await;
        let stream = futures_util::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|envelope| (Ok(envelope), receiver))
        });
        Ok(TransportSubscription::new(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::foundation::PartyId;
    use crate::infrastructure::transport::PropagateReply;
    use std::sync::Arc;

    fn identity(i: usize) -> ServerIdentity {
        ServerIdentity {
            address: format!("tls://10.0.0.{}:7000", i + 1),
            public: KeyPair::generate().public,
            description: format!("conode-{}", i),
            id: uuid::Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn delivers_between_registered_transports() {
        let hub = Arc::new(MockHub::new());
        let alice = identity(0);
        let bob = identity(1);
        let alice_transport = MockTransport::new(hub.clone(), alice.clone());
        let bob_transport = MockTransport::new(hub.clone(), bob.clone());

        let mut inbox = bob_transport.subscribe().await.expect("subscribe");
        alice_transport
            .send(&bob, PeerMessage::PropagateReply(PropagateReply { party: PartyId::new([1; 32]) }))
            .await
            .expect("send");

        let envelope = inbox.next().await.expect("next").expect("envelope");
        assert_eq!(envelope.sender.canonical(), alice.canonical());
        assert!(matches!(envelope.message, PeerMessage::PropagateReply(_)));
    }

    #[tokio::test]
    async fn send_to_unknown_peer_fails() {
        let hub = Arc::new(MockHub::new());
        let alice = identity(0);
        let transport = MockTransport::new(hub, alice);
        let stranger = identity(1);
        let result = transport.send(&stranger, PeerMessage::PropagateReply(PropagateReply { party: PartyId::new([0; 32]) })).await;
        assert!(result.is_err());
    }
}
