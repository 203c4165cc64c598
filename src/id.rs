//! Newtypes around Discord IDs.

use serde::{
    de::{Error as DeError, Unexpected, Visitor},
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    num::NonZeroU64,
};

macro_rules! impl_id {
    ($Id:ident) => {
        impl $Id {
            /// Creates a new Id from its raw snowflake, returning `None` for `0`.
            #[must_use]
            pub fn new(id: u64) -> Option<Self> {
                NonZeroU64::new(id).map(Self)
            }

            /// Returns the u64 representation of this Id.
            #[must_use]
            pub fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl Display for $Id {
            fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                Display::fmt(&self.0, f)
            }
        }

        impl From<NonZeroU64> for $Id {
            fn from(id: NonZeroU64) -> Self {
                Self(id)
            }
        }

        // Discord sends snowflakes as strings, but older payloads use numbers.
        impl Serialize for $Id {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $Id {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer
                    .deserialize_any(SnowflakeVisitor)
                    .map(Self)
            }
        }
    };
}

/// ID of a Discord voice/text channel.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ChannelId(NonZeroU64);

/// ID of a Discord guild (colloquially, "server").
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct GuildId(NonZeroU64);

/// ID of a Discord user.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct UserId(NonZeroU64);

impl_id! {ChannelId}
impl_id! {GuildId}
impl_id! {UserId}

struct SnowflakeVisitor;

impl<'de> Visitor<'de> for SnowflakeVisitor {
    type Value = NonZeroU64;

    fn expecting(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("a non-zero snowflake as an integer or string")
    }

    fn visit_u64<E: DeError>(self, v: u64) -> Result<Self::Value, E> {
        NonZeroU64::new(v).ok_or_else(|| E::invalid_value(Unexpected::Unsigned(v), &self))
    }

    fn visit_i64<E: DeError>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
            .and_then(|v| self.visit_u64(v))
    }

    fn visit_str<E: DeError>(self, v: &str) -> Result<Self::Value, E> {
        v.parse::<u64>()
            .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
            .and_then(|v| self.visit_u64(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_strings() {
        let id = GuildId::new(41771983423143937).unwrap();
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"41771983423143937\""
        );
    }

    #[test]
    fn ids_accept_strings_and_numbers() {
        let a: UserId = serde_json::from_str("\"1234\"").unwrap();
        let b: UserId = serde_json::from_str("1234").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.get(), 1234);
    }

    #[test]
    fn zero_id_is_rejected() {
        assert!(ChannelId::new(0).is_none());
        assert!(serde_json::from_str::<ChannelId>("\"0\"").is_err());
    }
}
