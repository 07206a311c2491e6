//! Attendee tokens: an attendee joins a signed final statement with their
//! keypair and signs (message, context) pairs anonymously against the
//! attendee ring. Stateless; servers only ever store and serve statements.

use crate::crypto::{ring, KeyPair, RingSignature, Tag};
use crate::domain::FinalStatement;
use crate::foundation::{PopError, Result};

pub struct PopToken {
    statement: FinalStatement,
    keypair: KeyPair,
    index: usize,
}

impl PopToken {
    /// Bind a keypair to a signed statement. Fails when the statement does
    /// not verify or the key is not among the attendees.
    pub fn join(statement: FinalStatement, keypair: KeyPair) -> Result<Self> {
        statement.verify()?;
        let index = statement
            .attendees
            .iter()
            .position(|attendee| *attendee == keypair.public)
            .ok_or_else(|| PopError::Internal("key is not part of the attendee list".to_string()))?;
        Ok(Self { statement, keypair, index })
    }

    pub fn sign(&self, message: &[u8], context: &[u8]) -> Result<RingSignature> {
        ring::sign(message, context, &self.statement.attendees, self.index, &self.keypair.secret)
    }
}

/// Verify an attendee signature against the statement's ring and check the
/// presented linkage tag.
pub fn verify_token(
    statement: &FinalStatement,
    message: &[u8],
    context: &[u8],
    signature: &RingSignature,
    tag: &Tag,
) -> Result<()> {
    let computed = ring::verify(message, context, &statement.attendees, signature)?;
    if computed != *tag {
        return Err(PopError::Crypto { operation: "token verify".to_string(), details: "linkage tag mismatch".to_string() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{schnorr, KeyPair};
    use crate::domain::{PopDesc, Roster, ServerIdentity};

    fn signed_statement(attendees: &[KeyPair]) -> FinalStatement {
        let conodes: Vec<KeyPair> = (0..2).map(|_| KeyPair::generate()).collect();
        let roster = Roster::new(
            conodes
                .iter()
                .enumerate()
                .map(|(i, pair)| ServerIdentity {
                    address: format!("tls://10.0.0.{}:7000", i + 1),
                    public: pair.public,
                    description: format!("conode-{}", i),
                    id: uuid::Uuid::new_v4(),
                })
                .collect(),
        );
        let mut statement = FinalStatement::new(PopDesc {
            name: "party".to_string(),
            date_time: "2025-12-27 23:00".to_string(),
            location: "hamburg".to_string(),
            roster,
            parties: vec![],
        });
        statement.attendees = attendees.iter().map(|pair| pair.public).collect();
        let aggregate = KeyPair::aggregate_secret(conodes.iter().map(|pair| &pair.secret));
        statement.signature = Some(schnorr::sign(&aggregate, &statement.hash()));
        statement
    }

    #[test]
    fn join_sign_verify_flow() {
        let attendees: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
        let statement = signed_statement(&attendees);

        let token = PopToken::join(statement.clone(), attendees[1].clone()).expect("join");
        let signature = token.sign(b"login", b"service-a").expect("sign");
        verify_token(&statement, b"login", b"service-a", &signature, &signature.tag).expect("verify");

        let other_tag = token.sign(b"login", b"service-b").expect("sign").tag;
        assert!(verify_token(&statement, b"login", b"service-a", &signature, &other_tag).is_err());
    }

    #[test]
    fn join_rejects_strangers() {
        let attendees: Vec<KeyPair> = (0..2).map(|_| KeyPair::generate()).collect();
        let statement = signed_statement(&attendees);
        assert!(PopToken::join(statement, KeyPair::generate()).is_err());
    }

    #[test]
    fn join_rejects_unsigned_statement() {
        let attendees: Vec<KeyPair> = (0..2).map(|_| KeyPair::generate()).collect();
        let mut statement = signed_statement(&attendees);
        statement.signature = None;
        assert!(PopToken::join(statement, attendees[0].clone()).is_err());
    }
}
