//! Typed records stored in the database.
//!
//! Records travel to and from [`Row`]s through serde: field names in the
//! serialized form are the column names. Reading is lenient in the same way
//! the stored data is loose: NULL columns fall back to the field default and
//! unknown columns are dropped with a warning.

mod broadcast;
mod cache_locally;

pub use self::broadcast::Broadcast;
pub use self::cache_locally::CacheLocally;
use crate::bundle::TableSpec;
use crate::error::{ErrorKind, Result};
use crate::executor::Row;
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A type persisted as one row of one table.
pub trait Record: Serialize + DeserializeOwned {
    const TABLE: &'static str;
    const KEY_COLUMNS: &'static [&'static str];
    const OTHER_COLUMNS: &'static [&'static str];

    fn table_spec() -> TableSpec {
        TableSpec::new(Self::TABLE, Self::KEY_COLUMNS.iter().copied(), Self::OTHER_COLUMNS.iter().copied())
    }

    fn to_row(&self) -> Result<Row> {
        match serde_json::to_value(self).or_raise(|| ErrorKind::InvalidData("record serialization"))? {
            Value::Object(row) => Ok(row),
            _ => exn::bail!(ErrorKind::InvalidData("record is not a map")),
        }
    }

    fn from_row(row: Row) -> Result<Self> {
        let mut known = Row::new();
        for (column, value) in row {
            if !Self::KEY_COLUMNS.contains(&column.as_str()) && !Self::OTHER_COLUMNS.contains(&column.as_str()) {
                tracing::warn!(table = Self::TABLE, column = %column, "unrecognised field from database table");
                continue;
            }
            if !value.is_null() {
                known.insert(column, value);
            }
        }
        serde_json::from_value(Value::Object(known)).or_raise(|| ErrorKind::InvalidData("record deserialization"))
    }
}

/// Booleans stored as INTEGER `0`/`1`.
///
/// Reads accept booleans, integers (non-zero is true) and numeric strings.
pub(crate) mod flag {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        deserializer.deserialize_any(FlagVisitor)
    }

    struct FlagVisitor;

    impl Visitor<'_> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a boolean or an integer flag")
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<bool, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<bool, E> {
            Ok(value != 0)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<bool, E> {
            Ok(value != 0)
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<bool, E> {
            Ok(value != 0.0)
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<bool, E> {
            match value.trim() {
                "true" => Ok(true),
                "false" | "" => Ok(false),
                other => other
                    .parse::<i64>()
                    .map(|number| number != 0)
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self)),
            }
        }
    }
}
