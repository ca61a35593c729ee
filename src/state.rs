use crate::habit::Habit;
use serde::{Deserialize, Serialize};

pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

/// Everything the store holds and persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub habits: Vec<Habit>,
    #[serde(default)]
    pub theme: Theme,
}

/// Pick the starting habit list: persisted data wins when it is non-empty,
/// otherwise the supplied defaults, otherwise nothing.
pub fn reconcile(persisted: Option<Vec<Habit>>, defaults: Option<Vec<Habit>>) -> Vec<Habit> {
    match persisted {
        Some(habits) if !habits.is_empty() => habits,
        _ => defaults.unwrap_or_default(),
    }
}
