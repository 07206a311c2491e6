use crate::foundation::PopError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

pub type Hash32 = [u8; 32];

pub fn parse_hex_32bytes(input: &str) -> Result<Hash32, PopError> {
    let trimmed = input.strip_prefix("0x").unwrap_or(input);
    let bytes = hex::decode(trimmed)?;
    let array: Hash32 = bytes
        .as_slice()
        .try_into()
        .map_err(|_| PopError::Encoding(format!("expected 32 bytes, got {}", bytes.len())))?;
    Ok(array)
}

macro_rules! define_id_type {
    (hash $name:ident) => {
        #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
        pub struct $name(Hash32);

        impl $name {
            pub const fn new(value: Hash32) -> Self {
                Self(value)
            }

            pub fn as_hash(&self) -> &Hash32 {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in self.0 {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }

        impl FromStr for $name {
            type Err = PopError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(parse_hex_32bytes(s)?))
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_string())
                } else {
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    s.parse().map_err(serde::de::Error::custom)
                } else {
                    let bytes = Hash32::deserialize(deserializer)?;
                    Ok(Self(bytes))
                }
            }
        }

        impl AsRef<Hash32> for $name {
            fn as_ref(&self) -> &Hash32 {
                &self.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = Hash32;
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<Hash32> for $name {
            fn from(value: Hash32) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Hash32 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

define_id_type!(hash PartyId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn party_id_from_str_accepts_prefixed_and_unprefixed() {
        let hex_prefixed = "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        let id1: PartyId = hex_prefixed.parse().expect("party id parse");
        assert_eq!(id1.to_string(), "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef");

        let hex_unprefixed = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        let id2: PartyId = hex_unprefixed.parse().expect("party id parse");
        assert_eq!(id1, id2);

        assert!("not-hex".parse::<PartyId>().is_err());
        assert!("0xabcd".parse::<PartyId>().is_err());
    }

    #[test]
    fn party_id_bincode_is_stable_fixed_width() {
        let id = PartyId::new([0xCD; 32]);
        let bytes = bincode::serialize(&id).expect("serialize bincode");
        assert_eq!(bytes.len(), 32);
    }
}
