use std::io;
use thiserror::Error;

/// Client-visible error codes carried on RPC replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ClientCode {
    WrongPin = 4100,
    Internal = 4101,
    OtherFinalsPending = 4102,
    Merge = 4103,
    Timeout = 4104,
}

#[derive(Debug, Error)]
pub enum PopError {
    #[error("wrong PIN: {0}")]
    WrongPin(String),

    #[error("{0}")]
    Internal(String),

    #[error("not all other conodes finalized yet: {0}")]
    OtherFinalsPending(String),

    #[error("merge failed: {0}")]
    Merge(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("storage error during {operation}: {details}")]
    Storage { operation: String, details: String },

    #[error("{format} serialization error: {details}")]
    Serialization { format: String, details: String },

    #[error("crypto error during {operation}: {details}")]
    Crypto { operation: String, details: String },

    #[error("transport error during {operation}: {details}")]
    Transport { operation: String, details: String },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PopError>;

impl PopError {
    /// The wire code shown to clients. Everything that is not one of the
    /// protocol errors collapses to `Internal`.
    pub fn client_code(&self) -> ClientCode {
        match self {
            PopError::WrongPin(_) => ClientCode::WrongPin,
            PopError::OtherFinalsPending(_) => ClientCode::OtherFinalsPending,
            PopError::Merge(_) => ClientCode::Merge,
            PopError::Timeout(_) => ClientCode::Timeout,
            _ => ClientCode::Internal,
        }
    }
}

impl From<io::Error> for PopError {
    fn from(err: io::Error) -> Self {
        PopError::Storage { operation: "io".to_string(), details: err.to_string() }
    }
}

impl From<bincode::Error> for PopError {
    fn from(err: bincode::Error) -> Self {
        PopError::Serialization { format: "bincode".to_string(), details: err.to_string() }
    }
}

impl From<toml::de::Error> for PopError {
    fn from(err: toml::de::Error) -> Self {
        PopError::Serialization { format: "toml".to_string(), details: err.to_string() }
    }
}

impl From<toml::ser::Error> for PopError {
    fn from(err: toml::ser::Error) -> Self {
        PopError::Serialization { format: "toml".to_string(), details: err.to_string() }
    }
}

impl From<hex::FromHexError> for PopError {
    fn from(err: hex::FromHexError) -> Self {
        PopError::Encoding(format!("hex decode error: {}", err))
    }
}

impl From<figment::Error> for PopError {
    fn from(err: figment::Error) -> Self {
        PopError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_codes_match_wire_values() {
        assert_eq!(ClientCode::WrongPin as u16, 4100);
        assert_eq!(ClientCode::Internal as u16, 4101);
        assert_eq!(ClientCode::OtherFinalsPending as u16, 4102);
        assert_eq!(ClientCode::Merge as u16, 4103);
        assert_eq!(ClientCode::Timeout as u16, 4104);
    }

    #[test]
    fn protocol_errors_keep_their_code() {
        assert_eq!(PopError::WrongPin("hint".into()).client_code(), ClientCode::WrongPin);
        assert_eq!(PopError::Timeout("signing".into()).client_code(), ClientCode::Timeout);
        let storage = PopError::Storage { operation: "save".into(), details: "disk full".into() };
        assert_eq!(storage.client_code(), ClientCode::Internal);
    }
}
