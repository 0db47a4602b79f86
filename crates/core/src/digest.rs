//! Digest scheduling and grouping.
//!
//! Pure logic shared by the digest aggregator and the preferences API:
//! deciding whether a user's digest is due at a given minute, and turning a
//! flat list of unread notifications into category groups.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::priority::Priority;
use crate::types::{DbId, Timestamp};

/// Trailing window of unread notifications included in a digest.
pub const DIGEST_WINDOW_HOURS: i64 = 24;

/// Maximum number of items displayed per category group.
pub const DIGEST_GROUP_LIMIT: usize = 5;

// ---------------------------------------------------------------------------
// Frequency
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestFrequency {
    #[default]
    Daily,
    Weekly,
}

impl DigestFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestFrequency::Daily => "daily",
            DigestFrequency::Weekly => "weekly",
        }
    }
}

impl fmt::Display for DigestFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestFrequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(DigestFrequency::Daily),
            "weekly" => Ok(DigestFrequency::Weekly),
            other => Err(CoreError::Validation(format!(
                "Unknown digest frequency '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for DigestFrequency {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// When a user wants to receive their digest (UTC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestSchedule {
    pub time: NaiveTime,
    pub frequency: DigestFrequency,
    /// ISO weekday numbers (1 = Monday .. 7 = Sunday). Only consulted for
    /// weekly digests.
    pub days: Vec<i16>,
}

impl DigestSchedule {
    /// Whether the digest is due in the minute containing `now`.
    ///
    /// Matches on hour and minute only; seconds are ignored so any tick
    /// inside the configured minute fires.
    pub fn is_due(&self, now: Timestamp) -> bool {
        if now.hour() != self.time.hour() || now.minute() != self.time.minute() {
            return false;
        }
        match self.frequency {
            DigestFrequency::Daily => true,
            DigestFrequency::Weekly => {
                let today = now.weekday().number_from_monday() as i16;
                self.days.contains(&today)
            }
        }
    }
}

/// Parse an `HH:MM` (or `HH:MM:SS`) digest time.
pub fn parse_digest_time(value: &str) -> Result<NaiveTime, CoreError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| CoreError::Validation(format!("Invalid digest time '{value}', expected HH:MM")))
}

/// Validate a list of ISO weekday numbers.
pub fn validate_digest_days(days: &[i16]) -> Result<(), CoreError> {
    match days.iter().find(|d| !(1..=7).contains(*d)) {
        Some(bad) => Err(CoreError::Validation(format!(
            "Invalid weekday {bad}, expected 1 (Monday) to 7 (Sunday)"
        ))),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// One unread notification as it appears in a digest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestEntry {
    pub id: DbId,
    pub category: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub created_at: Timestamp,
}

/// All unread notifications of one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestGroup {
    pub category: String,
    /// Displayed items, highest priority first, newest first within a priority.
    pub items: Vec<DigestEntry>,
    /// Number of items not displayed because the group exceeded the limit.
    pub overflow: usize,
    pub total: usize,
    pub top_priority: Priority,
}

/// A user's digest: category groups in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Digest {
    pub groups: Vec<DigestGroup>,
    pub total: usize,
}

impl Digest {
    /// Group `entries` by category, keeping at most `group_limit` items per
    /// group.
    ///
    /// Groups are ordered by their highest priority, then by size, then by
    /// category name.
    pub fn build(entries: Vec<DigestEntry>, group_limit: usize) -> Self {
        let total = entries.len();
        let mut by_category: BTreeMap<String, Vec<DigestEntry>> = BTreeMap::new();
        for entry in entries {
            by_category
                .entry(entry.category.clone())
                .or_default()
                .push(entry);
        }

        let mut groups: Vec<DigestGroup> = by_category
            .into_iter()
            .map(|(category, mut items)| {
                items.sort_by(|a, b| {
                    b.priority
                        .cmp(&a.priority)
                        .then_with(|| b.created_at.cmp(&a.created_at))
                });
                let group_total = items.len();
                let top_priority = items.first().map(|e| e.priority).unwrap_or_default();
                items.truncate(group_limit);
                DigestGroup {
                    category,
                    overflow: group_total - items.len(),
                    items,
                    total: group_total,
                    top_priority,
                }
            })
            .collect();

        groups.sort_by(|a, b| {
            b.top_priority
                .cmp(&a.top_priority)
                .then_with(|| b.total.cmp(&a.total))
                .then_with(|| a.category.cmp(&b.category))
        });

        Self { groups, total }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
