//! Durable per-service state, persisted as a single `pop.bin` file.
//!
//! The whole record is small (one organizer key plus a handful of
//! statements), so it is rewritten atomically on every change: serialize,
//! write to a sibling temp file, rename over the old one.

use crate::crypto::PublicKey;
use crate::domain::{FinalStatement, MergeMeta};
use crate::foundation::{PartyId, PopError, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const STORE_FILE: &str = "pop.bin";

/// Everything a conode must remember across restarts. Reply slots and
/// latches are runtime-only and rebuilt on load.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SaveData {
    pub pin: String,
    pub organizer: Option<PublicKey>,
    pub parties: HashMap<PartyId, FinalStatement>,
    pub merge_metas: HashMap<PartyId, MergeMeta>,
}

pub struct ServiceStore {
    path: PathBuf,
}

impl ServiceStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .map_err(|err| PopError::Storage { operation: "create data dir".to_string(), details: err.to_string() })?;
        Ok(Self { path: data_dir.join(STORE_FILE) })
    }

    fn codec() -> impl Options {
        bincode::DefaultOptions::new().with_fixint_encoding()
    }

    /// Load the saved state, or a fresh default when no file exists yet.
    pub fn load(&self) -> Result<SaveData> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(SaveData::default()),
            Err(err) => {
                return Err(PopError::Storage { operation: "read".to_string(), details: err.to_string() });
            }
        };
        Ok(Self::codec().deserialize(&bytes)?)
    }

    pub fn save(&self, data: &SaveData) -> Result<()> {
        let bytes = Self::codec().serialize(data)?;
        let tmp = self.path.with_extension("bin.tmp");
        fs::write(&tmp, &bytes).map_err(|err| PopError::Storage { operation: "write".to_string(), details: err.to_string() })?;
        fs::rename(&tmp, &self.path)
            .map_err(|err| PopError::Storage { operation: "rename".to_string(), details: err.to_string() })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::domain::{PopDesc, Roster, ServerIdentity};
    use tempfile::TempDir;

    fn sample_statement() -> FinalStatement {
        FinalStatement::new(PopDesc {
            name: "party".to_string(),
            date_time: "2025-12-27 23:00".to_string(),
            location: "hamburg".to_string(),
            roster: Roster::new(vec![ServerIdentity {
                address: "tls://10.0.0.1:7000".to_string(),
                public: KeyPair::generate().public,
                description: "conode-0".to_string(),
                id: uuid::Uuid::new_v4(),
            }]),
            parties: vec![],
        })
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = TempDir::new().expect("temp dir");
        let store = ServiceStore::open(dir.path()).expect("open");
        let data = store.load().expect("load");
        assert!(data.pin.is_empty());
        assert!(data.parties.is_empty());
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = TempDir::new().expect("temp dir");
        let store = ServiceStore::open(dir.path()).expect("open");

        let statement = sample_statement();
        let id = statement.desc.hash();
        let mut data = SaveData { pin: "123456".to_string(), organizer: Some(KeyPair::generate().public), ..Default::default() };
        data.parties.insert(id, statement.clone());
        data.merge_metas.insert(id, MergeMeta::seeded(id, statement));
        store.save(&data).expect("save");

        let loaded = store.load().expect("load");
        assert_eq!(loaded.pin, "123456");
        assert_eq!(loaded.organizer, data.organizer);
        assert_eq!(loaded.parties.get(&id), data.parties.get(&id));
        assert!(loaded.merge_metas.get(&id).expect("meta").statements.contains_key(&id));
    }

    #[test]
    fn save_overwrites_previous_state() {
        let dir = TempDir::new().expect("temp dir");
        let store = ServiceStore::open(dir.path()).expect("open");

        let mut data = SaveData { pin: "111111".to_string(), ..Default::default() };
        store.save(&data).expect("save");
        data.pin = "222222".to_string();
        store.save(&data).expect("save again");

        assert_eq!(store.load().expect("load").pin, "222222");
    }
}
