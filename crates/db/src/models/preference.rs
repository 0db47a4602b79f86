//! Per-user notification preference models and DTOs.

use std::collections::BTreeSet;

use chrono::NaiveTime;
use courier_core::channels::Channel;
use courier_core::digest::{
    parse_digest_time, validate_digest_days, DigestFrequency, DigestSchedule,
};
use courier_core::error::CoreError;
use courier_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `notification_preferences` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct NotificationPreference {
    pub user_id: DbId,
    pub digest_enabled: bool,
    pub digest_time: NaiveTime,
    #[sqlx(try_from = "String")]
    pub digest_frequency: DigestFrequency,
    /// ISO weekday numbers, 1 = Monday.
    pub digest_days: Vec<i16>,
    #[sqlx(json)]
    pub channel_opt_outs: BTreeSet<Channel>,
    pub digest_last_sent_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Digest time used for users who never saved preferences.
pub const DEFAULT_DIGEST_TIME: (u32, u32) = (8, 0);

impl NotificationPreference {
    /// Preferences of a user with no stored row: digest off, nothing opted out.
    pub fn defaults_for(user_id: DbId, now: Timestamp) -> Self {
        let (hour, minute) = DEFAULT_DIGEST_TIME;
        Self {
            user_id,
            digest_enabled: false,
            digest_time: NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default(),
            digest_frequency: DigestFrequency::Daily,
            digest_days: Vec::new(),
            channel_opt_outs: BTreeSet::new(),
            digest_last_sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn schedule(&self) -> DigestSchedule {
        DigestSchedule {
            time: self.digest_time,
            frequency: self.digest_frequency,
            days: self.digest_days.clone(),
        }
    }
}

/// DTO for updating preferences. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePreference {
    pub digest_enabled: Option<bool>,
    /// `HH:MM`, UTC.
    pub digest_time: Option<String>,
    pub digest_frequency: Option<DigestFrequency>,
    pub digest_days: Option<Vec<i16>>,
    pub channel_opt_outs: Option<BTreeSet<Channel>>,
}

impl UpdatePreference {
    /// Validate the request and convert it into typed column changes.
    pub fn into_changes(self) -> Result<PreferenceChanges, CoreError> {
        let digest_time = self
            .digest_time
            .as_deref()
            .map(parse_digest_time)
            .transpose()?;
        if let Some(days) = &self.digest_days {
            validate_digest_days(days)?;
        }
        Ok(PreferenceChanges {
            digest_enabled: self.digest_enabled,
            digest_time,
            digest_frequency: self.digest_frequency,
            digest_days: self.digest_days,
            channel_opt_outs: self.channel_opt_outs,
        })
    }
}

/// Validated preference changes, ready to upsert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferenceChanges {
    pub digest_enabled: Option<bool>,
    pub digest_time: Option<NaiveTime>,
    pub digest_frequency: Option<DigestFrequency>,
    pub digest_days: Option<Vec<i16>>,
    pub channel_opt_outs: Option<BTreeSet<Channel>>,
}

impl PreferenceChanges {
    /// Apply the changes on top of `pref`.
    pub fn apply(self, pref: &mut NotificationPreference) {
        if let Some(v) = self.digest_enabled {
            pref.digest_enabled = v;
        }
        if let Some(v) = self.digest_time {
            pref.digest_time = v;
        }
        if let Some(v) = self.digest_frequency {
            pref.digest_frequency = v;
        }
        if let Some(v) = self.digest_days {
            pref.digest_days = v;
        }
        if let Some(v) = self.channel_opt_outs {
            pref.channel_opt_outs = v;
        }
    }
}
