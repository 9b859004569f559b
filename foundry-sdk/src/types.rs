//! Identifiers and resource descriptions shared by every backend.
//!
//! Identifiers are 64-bit snowflakes. On the wire they travel as decimal
//! strings (the platform's JSON convention), but plain numbers are accepted
//! too so hand-written event files stay readable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                match RawSnowflake::deserialize(deserializer)? {
                    RawSnowflake::Number(n) => Ok(Self(n)),
                    RawSnowflake::Text(s) => s.parse().map_err(serde::de::Error::custom),
                }
            }
        }
    };
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSnowflake {
    Number(u64),
    Text(String),
}

snowflake_id!(
    /// A channel (resource) on the platform.
    ResourceId
);
snowflake_id!(
    /// A user (member) of a context.
    MemberId
);
snowflake_id!(
    /// The owning context of resources and members (a guild).
    ContextId
);

/// Resource category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Text,
    Voice,
    Category,
    Other,
}

impl ResourceKind {
    /// Platform channel type code.
    pub fn code(self) -> Option<u8> {
        match self {
            ResourceKind::Text => Some(0),
            ResourceKind::Voice => Some(2),
            ResourceKind::Category => Some(4),
            ResourceKind::Other => None,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ResourceKind::Text,
            2 => ResourceKind::Voice,
            4 => ResourceKind::Category,
            _ => ResourceKind::Other,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Text => write!(f, "text"),
            ResourceKind::Voice => write!(f, "voice"),
            ResourceKind::Category => write!(f, "category"),
            ResourceKind::Other => write!(f, "other"),
        }
    }
}

/// A resource as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub kind: ResourceKind,
    pub context: ContextId,
}
