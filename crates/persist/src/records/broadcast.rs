use super::{Record, flag};
use serde::{Deserialize, Serialize};
use time::UtcDateTime;

/// One content item offered for download.
///
/// Timestamps are Unix seconds; `None` leaves that end of the scheduling
/// window open.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Broadcast {
    pub id: String,
    pub distribution_time: Option<i64>,
    pub valid_from: Option<i64>,
    pub valid_to: Option<i64>,
    pub title: String,
    pub summary: String,
    pub broadcast: String,
    pub broadcast_icon: String,
    pub broadcast_type: String,
    pub parts: u32,
    pub parts_downloaded: u32,
    pub parts_unpacked: u32,
    pub parts_stitched: u32,
    #[serde(with = "flag")]
    pub downloaded: bool,
    #[serde(with = "flag")]
    pub unpacked: bool,
    #[serde(with = "flag")]
    pub stitched: bool,
    #[serde(with = "flag")]
    pub opened: bool,
    #[serde(with = "flag")]
    pub removed: bool,
    #[serde(with = "flag")]
    pub favourite: bool,
    #[serde(with = "flag")]
    pub notified: bool,
}

impl Record for Broadcast {
    const TABLE: &'static str = "broadcast";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const OTHER_COLUMNS: &'static [&'static str] = &[
        "distributionTime",
        "validFrom",
        "validTo",
        "title",
        "summary",
        "broadcast",
        "broadcastIcon",
        "broadcastType",
        // Download and assembly counts
        "parts",
        "partsDownloaded",
        "partsUnpacked",
        "partsStitched",
        // Completion flags
        "downloaded",
        "unpacked",
        "stitched",
        // Usage flags
        "opened",
        "removed",
        "favourite",
        "notified",
    ];
}

impl Broadcast {
    /// Whether `now` falls inside `[valid_from, valid_to)`.
    pub fn is_live_at(&self, now: UtcDateTime) -> bool {
        let now = now.unix_timestamp();
        self.valid_from.is_none_or(|from| now >= from) && self.valid_to.is_none_or(|to| now < to)
    }

    /// Downloaded, unpacked and stitched.
    pub fn is_assembled(&self) -> bool {
        self.downloaded && self.unpacked && self.stitched
    }
}
