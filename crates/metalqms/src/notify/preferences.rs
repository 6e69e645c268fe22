//! Per-user delivery preferences and the decision whether a message goes
//! out now, later, or not at all.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::category::NotificationCategory;

/// Moscow time, the plant default.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 180;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPreference {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub urgent_only: bool,
}

/// Local-time window in which non-urgent messages are held back.
///
/// The start is inclusive and the end exclusive; a window whose start is
/// after its end wraps midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    /// Returns `None` for an empty window (start equals end).
    pub fn new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (start != end).then_some(Self { start, end })
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start < self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }

    /// First moment at or after `local` where the window ends.
    pub fn end_after(&self, local: NaiveDateTime) -> NaiveDateTime {
        let today = local.date().and_time(self.end);
        if today > local {
            today
        } else {
            today + Duration::days(1)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NoPreferences,
    Disabled,
    NoChatId,
    CategoryDisabled,
    UrgentOnly,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoPreferences => "no notification preferences",
            Self::Disabled => "notifications disabled",
            Self::NoChatId => "no chat id",
            Self::CategoryDisabled => "category disabled",
            Self::UrgentOnly => "category is urgent-only",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Deliver,
    Drop(DropReason),
    /// Hold until the user's quiet hours are over.
    Suppress { until: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPreferences {
    pub user_id: i64,
    pub chat_id: Option<String>,
    pub enabled: bool,
    pub categories: BTreeMap<NotificationCategory, CategoryPreference>,
    pub quiet_hours: Option<QuietHours>,
    pub utc_offset_minutes: i32,
}

impl NotificationPreferences {
    /// Preferences a user gets on first contact: status updates, task
    /// assignments, urgent alerts and certificate results switched on.
    pub fn new(user_id: i64, chat_id: impl Into<String>) -> Self {
        let on = CategoryPreference {
            enabled: true,
            urgent_only: false,
        };
        let categories = [
            NotificationCategory::StatusUpdate,
            NotificationCategory::TaskAssignment,
            NotificationCategory::UrgentAlert,
            NotificationCategory::CertificateProcessed,
        ]
        .into_iter()
        .map(|c| (c, on))
        .collect();

        Self {
            user_id,
            chat_id: Some(chat_id.into()),
            enabled: true,
            categories,
            quiet_hours: None,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
        }
    }

    /// Categories missing from the map are treated as disabled.
    pub fn category(&self, category: NotificationCategory) -> CategoryPreference {
        self.categories.get(&category).copied().unwrap_or_default()
    }

    pub fn set_category(&mut self, category: NotificationCategory, enabled: bool, urgent_only: bool) {
        self.categories.insert(
            category,
            CategoryPreference {
                enabled,
                urgent_only,
            },
        );
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.naive_utc() + Duration::minutes(i64::from(self.utc_offset_minutes))
    }

    pub fn evaluate(
        &self,
        category: NotificationCategory,
        urgent: bool,
        now: DateTime<Utc>,
    ) -> Delivery {
        if !self.enabled {
            return Delivery::Drop(DropReason::Disabled);
        }
        if self.chat_id().is_none() {
            return Delivery::Drop(DropReason::NoChatId);
        }
        if urgent {
            return Delivery::Deliver;
        }

        let pref = self.category(category);
        if !pref.enabled {
            return Delivery::Drop(DropReason::CategoryDisabled);
        }
        if pref.urgent_only {
            return Delivery::Drop(DropReason::UrgentOnly);
        }

        if let Some(quiet) = self.quiet_hours {
            let local = self.local_time(now);
            if quiet.contains(local.time()) {
                let end_local = quiet.end_after(local);
                let end_utc = end_local - Duration::minutes(i64::from(self.utc_offset_minutes));
                return Delivery::Suppress {
                    until: Utc.from_utc_datetime(&end_utc),
                };
            }
        }

        Delivery::Deliver
    }
}
