//! Users and their activity preferences.

use chrono::{DateTime, TimeDelta, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Default idle gap that still joins two heartbeats into one duration.
pub const DEFAULT_HEARTBEATS_TIMEOUT_SECS: i64 = 600;
/// Lower clamp for a user's timeout preference.
pub const MIN_HEARTBEATS_TIMEOUT_SECS: i64 = 60;
/// Upper clamp for a user's timeout preference.
pub const MAX_HEARTBEATS_TIMEOUT_SECS: i64 = 3600;
/// Former default, upgraded to [`DEFAULT_HEARTBEATS_TIMEOUT_SECS`] on read.
pub const LEGACY_HEARTBEATS_TIMEOUT_SECS: i64 = 120;

/// A tracked user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub time_zone: Tz,
    pub start_of_week: Weekday,
    /// Raw preference as stored; read through [`User::heartbeats_timeout`].
    pub heartbeats_timeout_secs: i64,
    pub public_leaderboard: bool,
    pub share_badges: bool,
    /// Users with this flag are skipped by retention cleanup.
    pub exclude_from_retention: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates a user with default preferences in UTC.
    pub fn new(id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            time_zone: Tz::UTC,
            start_of_week: Weekday::Mon,
            heartbeats_timeout_secs: DEFAULT_HEARTBEATS_TIMEOUT_SECS,
            public_leaderboard: false,
            share_badges: false,
            exclude_from_retention: false,
            created_at,
        }
    }

    /// Effective timeout after legacy upgrade and clamping.
    pub fn heartbeats_timeout(&self) -> TimeDelta {
        TimeDelta::seconds(effective_timeout_secs(self.heartbeats_timeout_secs))
    }
}

/// Normalizes a stored timeout preference.
pub const fn effective_timeout_secs(preference: i64) -> i64 {
    if preference == LEGACY_HEARTBEATS_TIMEOUT_SECS || preference <= 0 {
        return DEFAULT_HEARTBEATS_TIMEOUT_SECS;
    }
    if preference < MIN_HEARTBEATS_TIMEOUT_SECS {
        MIN_HEARTBEATS_TIMEOUT_SECS
    } else if preference > MAX_HEARTBEATS_TIMEOUT_SECS {
        MAX_HEARTBEATS_TIMEOUT_SECS
    } else {
        preference
    }
}
