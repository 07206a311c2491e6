//! One-time PIN-gated linking of an organizer to this conode.

use crate::messages::PinRequest;
use crate::service::Service;
use log::info;
use pop_core::foundation::{PopError, Result};
use rand::Rng;

impl Service {
    /// An empty pin mints a fresh 6-digit PIN and emits it on the operator
    /// channel (the log). A matching pin binds the organizer's public key.
    /// The PIN survives a successful bind, so the same organizer can re-link
    /// idempotently.
    pub fn pin_request(&self, req: PinRequest) -> Result<()> {
        if req.pin.is_empty() {
            let pin = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
            self.update_state(|data| data.pin = pin.clone());
            info!("PIN: {}", pin);
            return Err(PopError::WrongPin("read the PIN in the server log".to_string()));
        }

        let matches = self.read_state(|data| !data.pin.is_empty() && data.pin == req.pin);
        if !matches {
            return Err(PopError::WrongPin("wrong PIN".to_string()));
        }

        self.update_state(|data| data.organizer = Some(req.public));
        info!("registered organizer key={} server={}", req.public, self.identity.address);
        Ok(())
    }

    /// Operator-facing accessor, mirroring the PIN line in the log.
    pub fn current_pin(&self) -> String {
        self.read_state(|data| data.pin.clone())
    }
}
