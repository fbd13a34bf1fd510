use core::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Id, SIZE_BINARY, SIZE_ENCODED};

impl Serialize for Id {
    /// Serializes the identifier as its canonical 16-character text form in
    /// human-readable formats, with the zero identifier mapping to `null`,
    /// and as the raw 10-byte blob otherwise.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            if self.is_zero() {
                return serializer.serialize_unit();
            }

            let buf = self.encode();
            let text = core::str::from_utf8(&buf).map_err(serde::ser::Error::custom)?;
            serializer.serialize_str(text)
        } else {
            serializer.serialize_bytes(self.as_bytes())
        }
    }
}

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = Id;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a 16-character encoded identifier, a 10-byte blob, or null")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v.len() {
            SIZE_ENCODED => Id::from_encoded(v.as_bytes()).map_err(de::Error::custom),
            0 => Ok(Id::ZERO),
            size => Err(de::Error::custom(Error::InvalidDataSize { size })),
        }
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v.len() {
            SIZE_BINARY => Id::try_from(v).map_err(de::Error::custom),
            SIZE_ENCODED => Id::from_encoded(v).map_err(de::Error::custom),
            0 => Ok(Id::ZERO),
            size => Err(de::Error::custom(Error::InvalidDataSize { size })),
        }
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Id::ZERO)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Id::ZERO)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        Id::deserialize(deserializer)
    }

    fn visit_bool<E>(self, _: bool) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Err(de::Error::custom(Error::InvalidType { shape: "boolean" }))
    }

    fn visit_i64<E>(self, _: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Err(de::Error::custom(Error::InvalidType { shape: "integer" }))
    }

    fn visit_u64<E>(self, _: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Err(de::Error::custom(Error::InvalidType { shape: "integer" }))
    }

    fn visit_f64<E>(self, _: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Err(de::Error::custom(Error::InvalidType { shape: "float" }))
    }

    fn visit_map<A>(self, _: A) -> Result<Self::Value, A::Error>
    where
        A: de::MapAccess<'de>,
    {
        Err(de::Error::custom(Error::InvalidType { shape: "map" }))
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(IdVisitor)
        } else {
            deserializer.deserialize_bytes(IdVisitor)
        }
    }
}
