use super::{Record, flag};
use crate::error::Result;
use crate::table::{Action, Table};
use serde::{Deserialize, Serialize};
use time::UtcDateTime;

/// One downloadable fragment of a piece of content.
///
/// Fragments are addressed by `(owner_id, key, part_number)`. Once a
/// fragment is complete it is garbage: the cache loader deletes it instead
/// of caching it.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheLocally {
    pub owner_id: String,
    pub key: String,
    pub part_number: u32,
    #[serde(rename = "URL")]
    pub url: String,
    pub path: String,
    pub object_type: String,
    pub part_of: String,
    pub failures: u32,
    /// Unix seconds of the most recent failed attempt.
    pub last_failure: Option<i64>,
    #[serde(with = "flag")]
    pub downloaded: bool,
    #[serde(with = "flag")]
    pub unpacked: bool,
    #[serde(with = "flag")]
    pub stitched: bool,
}

impl Record for CacheLocally {
    const TABLE: &'static str = "cacheLocally";
    const KEY_COLUMNS: &'static [&'static str] = &["ownerId", "key", "partNumber"];
    const OTHER_COLUMNS: &'static [&'static str] = &[
        "URL",
        "path",
        "objectType",
        "partOf",
        "failures",
        "lastFailure",
        "downloaded",
        "unpacked",
        "stitched",
    ];
}

impl CacheLocally {
    pub fn is_complete(&self) -> bool {
        self.downloaded && self.unpacked && self.stitched
    }

    /// `ownerId/key#partNumber`, for logs.
    pub fn designation(&self) -> String {
        format!("{}/{}#{}", self.owner_id, self.key, self.part_number)
    }

    pub fn record_failure(&mut self, at: UtcDateTime) {
        self.failures += 1;
        self.last_failure = Some(at.unix_timestamp());
    }

    /// Delete this fragment's row.
    pub async fn unpersist(&self, table: &Table) -> Result<Action> {
        table.remove(&self.to_row()?).await
    }
}
