use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Opaque habit identifier. New habits get a UUID string; documents written
/// by other clients may carry plain numbers, which are kept as they are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HabitId {
    Number(i64),
    Text(String),
}

impl HabitId {
    pub fn new() -> Self {
        HabitId::Text(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HabitId::Number(n) => n.fmt(f),
            HabitId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountDirection {
    #[default]
    Up,
    Down,
}

impl fmt::Display for CountDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountDirection::Up => f.write_str("up"),
            CountDirection::Down => f.write_str("down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(with = "date_format")]
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: HabitId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub bg_color: String,
    #[serde(default)]
    pub timer_duration: Option<u32>,
    #[serde(default)]
    pub count_direction: CountDirection,
    #[serde(default = "default_amount")]
    pub count_amount: u32,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// Fields this crate does not model, such as `textColor`. Written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_amount() -> u32 {
    1
}

impl Habit {
    /// Build a fresh habit from a draft. Returns `None` when the trimmed name is empty.
    pub fn from_draft(draft: &HabitDraft, now: DateTime<Utc>) -> Option<Self> {
        if draft.name.trim().is_empty() {
            return None;
        }
        Some(Self {
            id: HabitId::new(),
            name: draft.name.clone(),
            description: draft.description.clone().unwrap_or_default(),
            count: 0,
            bg_color: draft.bg_color.clone().unwrap_or_default(),
            timer_duration: draft.timer_duration.filter(|m| *m > 0),
            count_direction: draft.count_direction.unwrap_or_default(),
            count_amount: draft.count_amount.filter(|a| *a > 0).unwrap_or(1),
            created_at: now,
            last_updated: now,
            streak: 0,
            history: Vec::new(),
            extra: Map::new(),
        })
    }

    /// Timer length in minutes, if this is a countdown habit.
    pub fn timer_minutes(&self) -> Option<u32> {
        self.timer_duration.filter(|m| *m > 0)
    }

    pub fn step(&self) -> i64 {
        i64::from(self.count_amount.max(1))
    }

    /// Apply one increment as of `now`: move the count, upsert today's history
    /// entry and recompute the streak.
    pub fn record_increment(&mut self, now: DateTime<Local>) {
        let count = match self.count_direction {
            CountDirection::Up => self.count.saturating_add(self.step()),
            CountDirection::Down => self.count.saturating_sub(self.step()),
        };
        let today = now.date_naive();
        let previous = self.history.last().map(|h| h.date);

        match self.history.iter_mut().find(|h| h.date == today) {
            Some(entry) => entry.count = count,
            None => self.history.push(HistoryEntry { date: today, count }),
        }

        if self.count_direction == CountDirection::Up && count > 0 {
            self.streak = next_streak(self.streak, previous, today);
        }

        self.count = count;
        self.last_updated = now.with_timezone(&Utc);
    }

    pub fn apply(&mut self, patch: &HabitPatch) {
        if let Some(name) = &patch.name {
            if !name.trim().is_empty() {
                self.name = name.clone();
            }
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(color) = &patch.bg_color {
            self.bg_color = color.clone();
        }
        if let Some(timer) = patch.timer_duration {
            self.timer_duration = timer.filter(|m| *m > 0);
        }
        if let Some(direction) = patch.count_direction {
            self.count_direction = direction;
        }
        if let Some(amount) = patch.count_amount {
            self.count_amount = amount.max(1);
        }
    }
}

/// Streak after an increment on `today`, given the date of the last history
/// entry before the increment.
///
/// Only a "yesterday" predecessor extends the streak and an empty history
/// starts it at 1. A longer gap leaves the streak as it was.
pub fn next_streak(streak: u32, previous: Option<NaiveDate>, today: NaiveDate) -> u32 {
    match previous {
        None => 1,
        Some(date) if date == today - Duration::days(1) => streak.saturating_add(1),
        Some(_) => streak,
    }
}

/// Form input for a new habit. Unset fields take the habit defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_direction: Option<CountDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_amount: Option<u32>,
}

impl HabitDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Partial update. `timer_duration: Some(None)` clears the timer.
#[derive(Debug, Clone, Default)]
pub struct HabitPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub bg_color: Option<String>,
    pub timer_duration: Option<Option<u32>>,
    pub count_direction: Option<CountDirection>,
    pub count_amount: Option<u32>,
}

impl HabitPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.bg_color.is_none()
            && self.timer_duration.is_none()
            && self.count_direction.is_none()
            && self.count_amount.is_none()
    }
}

mod date_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}
