//! Configuration loading: the conode's own service settings (figment: TOML
//! file with `POP_*` environment overrides) and the organizer-provided party
//! description files.

use crate::crypto::PublicKey;
use crate::domain::{PopDesc, Roster, ServerIdentity, ShortDesc};
use crate::foundation::{parse_hex_32bytes, PopError, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub data_dir: String,
    #[serde(default)]
    pub listen_addr: String,
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default)]
    pub log_filters: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: ".".to_string(),
            listen_addr: "0.0.0.0:6879".to_string(),
            log_dir: None,
            log_filters: "info".to_string(),
        }
    }
}

/// Load the service configuration, layering an optional TOML file and
/// `POP_*` environment variables over the defaults.
pub fn load_service_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let mut figment = Figment::from(Serialized::defaults(ServiceConfig::default()));
    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }
    Ok(figment.merge(Env::prefixed("POP_")).extract()?)
}

// Party description files as organizers write them:
//
//   Name = "32c3"
//   DateTime = "2025-12-27 23:00"
//   Location = "hamburg"
//   [[Servers]]
//   Address = "tls://10.0.0.1:7000"
//   Public = "<hex>"
//   Description = "conode-0"
//   ID = "<uuid>"
//   [[parties]]
//   Location = "geneva"
//   [[parties.Servers]]
//   ...

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PartyDescToml {
    name: String,
    date_time: String,
    location: String,
    servers: Vec<ServerEntryToml>,
    #[serde(default, rename = "parties")]
    parties: Vec<SiblingToml>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServerEntryToml {
    address: String,
    public: String,
    description: String,
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SiblingToml {
    location: String,
    servers: Vec<ServerEntryToml>,
}

fn entries_to_roster(entries: &[ServerEntryToml]) -> Result<Roster> {
    let servers = entries
        .iter()
        .map(|entry| {
            Ok(ServerIdentity {
                address: entry.address.clone(),
                public: PublicKey::from_bytes(&parse_hex_32bytes(&entry.public)?)?,
                description: entry.description.clone(),
                id: Uuid::parse_str(&entry.id).map_err(|err| PopError::Config(format!("bad server ID: {}", err)))?,
            })
        })
        .collect::<Result<_>>()?;
    Ok(Roster::new(servers))
}

pub fn parse_party_description(text: &str) -> Result<PopDesc> {
    let raw: PartyDescToml = toml::from_str(text)?;
    Ok(PopDesc {
        name: raw.name,
        date_time: raw.date_time,
        location: raw.location,
        roster: entries_to_roster(&raw.servers)?,
        parties: raw
            .parties
            .iter()
            .map(|sibling| Ok(ShortDesc { location: sibling.location.clone(), roster: entries_to_roster(&sibling.servers)? }))
            .collect::<Result<_>>()?,
    })
}

pub fn load_party_description(path: &Path) -> Result<PopDesc> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| PopError::Config(format!("cannot read {}: {}", path.display(), err)))?;
    parse_party_description(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn server_block(i: usize, key: &PublicKey) -> String {
        format!(
            "[[Servers]]\nAddress = \"tls://10.0.0.{}:7000\"\nPublic = \"{}\"\nDescription = \"conode-{}\"\nID = \"{}\"\n",
            i + 1,
            key.canonical(),
            i,
            Uuid::new_v4()
        )
    }

    #[test]
    fn parses_party_description_with_siblings() {
        let keys: Vec<PublicKey> = (0..3).map(|_| KeyPair::generate().public).collect();
        let mut text = String::from("Name = \"32c3\"\nDateTime = \"2025-12-27 23:00\"\nLocation = \"hamburg\"\n");
        text.push_str(&server_block(0, &keys[0]));
        text.push_str(&server_block(1, &keys[1]));
        text.push_str("[[parties]]\nLocation = \"geneva\"\n");
        text.push_str(&server_block(2, &keys[2]).replace("[[Servers]]", "[[parties.Servers]]"));

        let desc = parse_party_description(&text).expect("parse");
        assert_eq!(desc.name, "32c3");
        assert_eq!(desc.roster.len(), 2);
        assert_eq!(desc.parties.len(), 1);
        assert_eq!(desc.parties[0].location, "geneva");
        assert_eq!(desc.parties[0].roster.len(), 1);
        assert_eq!(desc.roster.servers()[0].public, keys[0]);
    }

    #[test]
    fn rejects_malformed_server_entries() {
        let text = "Name = \"x\"\nDateTime = \"now\"\nLocation = \"y\"\n[[Servers]]\nAddress = \"a\"\nPublic = \"zz\"\nDescription = \"d\"\nID = \"not-a-uuid\"\n";
        assert!(parse_party_description(text).is_err());
    }

    #[test]
    fn service_config_defaults_apply() {
        let config = load_service_config(None).expect("load");
        assert_eq!(config.data_dir, ".");
        assert_eq!(config.log_filters, "info");
    }

    #[test]
    fn service_config_reads_toml_file() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("pop.toml");
        std::fs::write(&path, "data_dir = \"/var/lib/pop\"\nlog_filters = \"debug\"\n").expect("write");
        let config = load_service_config(Some(&path)).expect("load");
        assert_eq!(config.data_dir, "/var/lib/pop");
        assert_eq!(config.log_filters, "debug");
    }
}
