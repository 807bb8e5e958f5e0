//! Opaque identifiers for shares and control connections.
//!
//! Both are 128 bits drawn from the thread RNG and travel hex-encoded.
//! Share ids double as the capability to join a share, so they must never
//! be predictable or derived from anything the client controls.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of every identifier in bytes.
pub const ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("identifier must be {} bytes, got {0}", ID_LEN)]
    WrongLength(usize),
}

fn decode_id(s: &str) -> Result<[u8; ID_LEN], IdError> {
    let bytes = hex::decode(s).map_err(|e| IdError::InvalidHex(e.to_string()))?;
    if bytes.len() != ID_LEN {
        return Err(IdError::WrongLength(bytes.len()));
    }
    let mut arr = [0u8; ID_LEN];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

macro_rules! random_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; ID_LEN]);

        impl $name {
            /// Draw a fresh identifier from the thread RNG.
            pub fn generate() -> Self {
                let mut bytes = [0u8; ID_LEN];
                rand::thread_rng().fill_bytes(&mut bytes);
                Self(bytes)
            }

            pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; ID_LEN] {
                &self.0
            }

            /// First 8 hex characters, for log lines.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short())
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_id(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                decode_id(&s).map(Self).map_err(serde::de::Error::custom)
            }
        }
    };
}

random_id!(
    /// Identifies one share session. Handed out in share links.
    ShareId
);

random_id!(
    /// Identifies one live control connection. Assigned by the server on
    /// connect and used as the address for relayed pushes and signals.
    ConnectionId
);
