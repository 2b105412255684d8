//! Identity types for walletctl
//!
//! Each stored record kind gets its own ID newtype, so an `AppId` can never
//! be bound where a `SpendId` column is expected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::TypesError;

/// Row key newtype over a v4 UUID, shown as `<prefix>_<uuid>` in logs
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap a key read back from storage
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Accepts the logged form or a bare UUID. A different prefix is rejected.
            pub fn parse(s: &str) -> Result<Self, TypesError> {
                let bare = match s.split_once('_') {
                    Some(($prefix, rest)) => rest,
                    Some(_) => {
                        return Err(TypesError::InvalidId {
                            kind: $prefix,
                            value: s.to_string(),
                            reason: format!("expected prefix {}_", $prefix),
                        })
                    }
                    None => s,
                };
                Uuid::parse_str(bare)
                    .map(Self)
                    .map_err(|e| TypesError::InvalidId {
                        kind: $prefix,
                        value: s.to_string(),
                        reason: e.to_string(),
                    })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_id_type!(AppId, "app", "Unique identifier for a registered client application");
define_id_type!(GrantId, "grant", "Unique identifier for a permission grant");
define_id_type!(RequestEventId, "reqevt", "Unique identifier for a recorded request event");
define_id_type!(SpendId, "spend", "Unique identifier for a spend record");

/// A 32-byte x-only public key, kept as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey(String);

impl PublicKey {
    /// Parse and normalise a hex-encoded public key
    pub fn parse(s: &str) -> Result<Self, TypesError> {
        let bytes = hex::decode(s).map_err(|e| TypesError::InvalidPublicKey {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        if bytes.len() != 32 {
            return Err(TypesError::InvalidPublicKey {
                value: s.to_string(),
                reason: format!("expected 32 bytes, got {}", bytes.len()),
            });
        }
        Ok(Self(hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PublicKey {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PublicKey {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.0
    }
}

/// A registered client application
///
/// Applications are created at connection time by the operator and are
/// read-only to the request pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: AppId,
    pub name: String,
    pub pubkey: PublicKey,
    pub created_at: DateTime<Utc>,
}

impl Application {
    /// Create a new application record
    pub fn new(name: impl Into<String>, pubkey: PublicKey) -> Self {
        Self {
            id: AppId::new(),
            name: name.into(),
            pubkey,
            created_at: Utc::now(),
        }
    }
}
