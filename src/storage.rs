//! Persistence for the habit document.
//!
//! The whole [`AppState`](crate::state::AppState) lives in one JSON document
//! shaped `{"state": {"habits": [...], "theme": "..."}, "version": 1}`. Every
//! write lands under both [`PRIMARY_KEY`] and [`BACKUP_KEY`] so a damaged
//! primary can be rebuilt from the mirror on the next read.
//!
//! Nothing here returns an error to the store: reads degrade to `None` and
//! writes report success as a `bool`, with the reason logged.

use crate::config::atomic_write;
use crate::error::Result;
use crate::habit::Habit;
use crate::state::{Theme, DOCUMENT_VERSION};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

pub const PRIMARY_KEY: &str = "habit-storage";
pub const BACKUP_KEY: &str = "habit-storage-backup";
const PROBE_KEY: &str = "__storage_test__";

/// Minimal string key-value backend.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// One `<key>.json` file per key inside a directory. Writes are atomic per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)?;
        }
        atomic_write(&self.path(key), value.as_bytes())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process map. `failing` makes every call error, like a disabled store.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: std::collections::BTreeMap<String, String>,
    failing: bool,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            entries: Default::default(),
            failing: true,
        }
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            return Err(crate::error::HbError::Storage("storage unavailable".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.check()?;
        self.entries.remove(key);
        Ok(())
    }
}

/// What a single key currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    Missing,
    Unreadable(String),
    Corrupt(String),
    Empty,
    Habits(usize),
}

pub struct Storage<S> {
    kv: S,
}

impl<S: KeyValueStore> Storage<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    #[cfg(test)]
    pub fn backend(&self) -> &S {
        &self.kv
    }

    #[cfg(test)]
    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.kv
    }

    /// Probe the backend with a throwaway write.
    pub fn is_available(&mut self) -> bool {
        let probe = self
            .kv
            .set(PROBE_KEY, PROBE_KEY)
            .and_then(|()| self.kv.remove(PROBE_KEY));
        match probe {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "storage probe failed");
                false
            }
        }
    }

    /// Habits from the primary key, or from the backup when the primary has
    /// none. A backup hit is written back so the primary is repaired.
    pub fn read_habits(&mut self) -> Option<Vec<Habit>> {
        if let Some(habits) = self.habits_at(PRIMARY_KEY) {
            return Some(habits);
        }

        debug!("primary storage empty, checking backup");
        let habits = self.habits_at(BACKUP_KEY)?;
        info!(count = habits.len(), "restoring habits from backup to primary storage");
        if !self.write_habits(&habits) {
            warn!("could not repair primary storage from backup");
        }
        Some(habits)
    }

    pub fn write_habits(&mut self, habits: &[Habit]) -> bool {
        match serde_json::to_value(habits) {
            Ok(value) => self.write_raw_habits(value),
            Err(e) => {
                error!(error = %e, "failed to serialize habits");
                false
            }
        }
    }

    /// Write an already-serialized habit list. Anything but a JSON array is
    /// refused.
    pub fn write_raw_habits(&mut self, habits: Value) -> bool {
        let Some(list) = habits.as_array() else {
            error!(value = %habits, "refusing to store habits that are not a list");
            return false;
        };
        if list.is_empty() {
            warn!("saving an empty habit list");
        }
        debug!(count = list.len(), "writing habits");

        let document = self.merged_document("habits", habits);
        if !self.write_both(&document) {
            return false;
        }

        let verified = self
            .document_at(PRIMARY_KEY)
            .as_ref()
            .and_then(habit_array)
            .is_some_and(|list| !list.is_empty());
        if !verified {
            warn!("storage verification found no habits in primary document");
        }
        verified
    }

    pub fn read_theme(&self) -> Option<Theme> {
        [PRIMARY_KEY, BACKUP_KEY].into_iter().find_map(|key| {
            let theme = self.document_at(key)?.get("state")?.get("theme")?.clone();
            serde_json::from_value(theme).ok()
        })
    }

    pub fn write_theme(&mut self, theme: Theme) -> bool {
        let document = self.merged_document("theme", json!(theme));
        if !self.write_both(&document) {
            return false;
        }
        self.document_at(PRIMARY_KEY)
            .and_then(|doc| doc.get("state")?.get("theme").cloned())
            .is_some_and(|stored| stored == json!(theme))
    }

    /// The raw document, primary first.
    pub fn read_document(&self) -> Option<Value> {
        self.document_at(PRIMARY_KEY)
            .or_else(|| self.document_at(BACKUP_KEY))
    }

    pub fn key_status(&self, key: &str) -> KeyStatus {
        let raw = match self.kv.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return KeyStatus::Missing,
            Err(e) => return KeyStatus::Unreadable(e.to_string()),
        };
        let document: Value = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => return KeyStatus::Corrupt(e.to_string()),
        };
        match habit_array(&document) {
            None => KeyStatus::Corrupt("missing state.habits".to_string()),
            Some(list) if list.is_empty() => KeyStatus::Empty,
            Some(list) => match parse_habits(key, list).len() {
                0 => KeyStatus::Corrupt("no usable habit entries".to_string()),
                n => KeyStatus::Habits(n),
            },
        }
    }

    fn habits_at(&self, key: &str) -> Option<Vec<Habit>> {
        let document = self.document_at(key)?;
        let list = habit_array(&document)?;
        if list.is_empty() {
            return None;
        }
        let habits = parse_habits(key, list);
        if habits.is_empty() {
            warn!(key, entries = list.len(), "no usable habits in storage");
            return None;
        }
        debug!(key, count = habits.len(), "found habits in storage");
        Some(habits)
    }

    fn document_at(&self, key: &str) -> Option<Value> {
        let raw = match self.kv.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "failed to read storage");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(key, error = %e, "error parsing storage data");
                None
            }
        }
    }

    /// The current document with `state.<field>` replaced. The primary is the
    /// base, then the backup; unknown fields survive. With neither usable the
    /// document starts from scratch.
    fn merged_document(&self, field: &str, value: Value) -> Value {
        let mut document = [PRIMARY_KEY, BACKUP_KEY]
            .into_iter()
            .filter_map(|key| self.document_at(key))
            .find(|doc| doc.get("state").is_some_and(Value::is_object))
            .unwrap_or_else(|| {
                json!({
                    "state": { "habits": [], "theme": Theme::default() },
                    "version": DOCUMENT_VERSION,
                })
            });
        document["state"][field] = value;
        document
    }

    fn write_both(&mut self, document: &Value) -> bool {
        let payload = document.to_string();
        for key in [PRIMARY_KEY, BACKUP_KEY] {
            if let Err(e) = self.kv.set(key, &payload) {
                error!(key, error = %e, "failed to write storage");
                return false;
            }
        }
        true
    }
}

fn habit_array(document: &Value) -> Option<&Vec<Value>> {
    document.get("state")?.get("habits")?.as_array()
}

/// Decode entries one by one, skipping any that do not fit the habit shape.
fn parse_habits(key: &str, list: &[Value]) -> Vec<Habit> {
    list.iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<Habit>(entry.clone()) {
            Ok(habit) => Some(habit),
            Err(e) => {
                warn!(key, index, error = %e, "skipping unreadable habit entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habit::{HabitDraft, HabitId};
    use chrono::{Local, Utc};

    fn sample(names: &[&str]) -> Vec<Habit> {
        names
            .iter()
            .filter_map(|n| Habit::from_draft(&HabitDraft::named(*n), Utc::now()))
            .collect()
    }

    #[test]
    fn memory_store_is_available() {
        let mut storage = Storage::new(MemoryStore::new());
        assert!(storage.is_available());
        assert_eq!(storage.backend().get(PROBE_KEY).unwrap(), None);
    }

    #[test]
    fn unavailable_store_degrades_quietly() {
        let mut storage = Storage::new(MemoryStore::unavailable());
        assert!(!storage.is_available());
        assert_eq!(storage.read_habits(), None);
        assert!(!storage.write_habits(&sample(&["Physics"])));
        assert_eq!(storage.read_theme(), None);
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut storage = Storage::new(MemoryStore::new());
        let mut habits = sample(&["Physics", "Chemistry"]);
        habits[0].record_increment(Local::now());
        habits[1].bg_color = "#C4B5FD".to_string();
        habits[1].timer_duration = Some(45);

        assert!(storage.write_habits(&habits));
        assert_eq!(storage.read_habits(), Some(habits));
    }

    #[test]
    fn both_keys_hold_identical_documents() {
        let mut storage = Storage::new(MemoryStore::new());
        assert!(storage.write_habits(&sample(&["Physics"])));
        let primary = storage.backend().get(PRIMARY_KEY).unwrap();
        let backup = storage.backend().get(BACKUP_KEY).unwrap();
        assert!(primary.is_some());
        assert_eq!(primary, backup);

        let doc: Value = serde_json::from_str(&primary.unwrap()).unwrap();
        assert_eq!(doc["version"], json!(1));
        assert_eq!(doc["state"]["theme"], json!("light"));
    }

    #[test]
    fn backup_repairs_missing_primary() {
        let mut storage = Storage::new(MemoryStore::new());
        let habits = sample(&["Biology"]);
        assert!(storage.write_habits(&habits));
        assert!(storage.write_theme(Theme::Dark));

        storage.backend_mut().remove(PRIMARY_KEY).unwrap();
        assert_eq!(storage.read_habits(), Some(habits.clone()));

        assert_eq!(storage.key_status(PRIMARY_KEY), KeyStatus::Habits(1));
        assert_eq!(storage.read_habits(), Some(habits));
        assert_eq!(storage.read_theme(), Some(Theme::Dark));
        let backup: Value = serde_json::from_str(&storage.backend().get(BACKUP_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(backup["state"]["theme"], json!("dark"));
    }

    #[test]
    fn repair_keeps_unknown_fields_from_backup() {
        let mut storage = Storage::new(MemoryStore::new());
        storage
            .backend_mut()
            .set(BACKUP_KEY, LEGACY_DOCUMENT)
            .unwrap();

        assert_eq!(storage.read_habits().map(|h| h.len()), Some(2));
        let primary: Value = serde_json::from_str(&storage.backend().get(PRIMARY_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(primary["state"]["theme"], json!("dark"));
        assert_eq!(primary["state"]["habits"][0]["id"], json!(1700000000000i64));
        assert_eq!(primary["state"]["habits"][0]["textColor"], json!(""));
        assert_eq!(primary["exportedBy"], json!("web"));
    }

    const LEGACY_DOCUMENT: &str = r##"{
        "state": {
            "habits": [
                {
                    "id": 1700000000000,
                    "name": "Physics",
                    "description": "",
                    "count": 4,
                    "bgColor": "#93C5FD",
                    "textColor": "",
                    "timerDuration": 60,
                    "countDirection": "up",
                    "countAmount": 1,
                    "createdAt": "2023-11-14T22:13:20.000Z",
                    "lastUpdated": "2023-11-15T08:00:00.000Z",
                    "streak": 2,
                    "history": [{"date": "2023-11-14", "count": 2}, {"date": "2023-11-15", "count": 4}]
                },
                {
                    "id": 1700000000001,
                    "name": "Chemistry",
                    "count": 0,
                    "createdAt": "2023-11-14T22:13:20.000Z",
                    "lastUpdated": "2023-11-14T22:13:20.000Z"
                }
            ],
            "theme": "dark"
        },
        "version": 1,
        "exportedBy": "web"
    }"##;

    #[test]
    fn reads_documents_with_numeric_ids() {
        let mut storage = Storage::new(MemoryStore::new());
        storage.backend_mut().set(PRIMARY_KEY, LEGACY_DOCUMENT).unwrap();

        let habits = storage.read_habits().unwrap();
        assert_eq!(habits.len(), 2);
        assert_eq!(habits[0].id, HabitId::Number(1_700_000_000_000));
        assert_eq!(habits[0].streak, 2);
        assert_eq!(habits[0].history.len(), 2);
        assert_eq!(habits[1].count_amount, 1);
        assert_eq!(storage.key_status(PRIMARY_KEY), KeyStatus::Habits(2));
    }

    #[test]
    fn one_bad_entry_does_not_drop_the_rest() {
        let mut storage = Storage::new(MemoryStore::new());
        storage
            .backend_mut()
            .set(
                PRIMARY_KEY,
                r#"{"state":{"habits":[
                    {"name":"no id or dates"},
                    {"id":"a1","name":"Reading","createdAt":"2024-01-01T00:00:00Z","lastUpdated":"2024-01-01T00:00:00Z"}
                ]},"version":1}"#,
            )
            .unwrap();

        let habits = storage.read_habits().unwrap();
        assert_eq!(habits.len(), 1);
        assert_eq!(habits[0].name, "Reading");
        assert_eq!(storage.key_status(PRIMARY_KEY), KeyStatus::Habits(1));

        storage
            .backend_mut()
            .set(PRIMARY_KEY, r#"{"state":{"habits":[{"name":"broken"}]},"version":1}"#)
            .unwrap();
        assert!(matches!(storage.key_status(PRIMARY_KEY), KeyStatus::Corrupt(_)));
    }

    #[test]
    fn backup_repairs_corrupt_primary() {
        let mut storage = Storage::new(MemoryStore::new());
        let habits = sample(&["Biology"]);
        assert!(storage.write_habits(&habits));

        storage.backend_mut().set(PRIMARY_KEY, "{not json").unwrap();
        assert_eq!(storage.read_habits(), Some(habits));
        assert_eq!(storage.key_status(PRIMARY_KEY), KeyStatus::Habits(1));
    }

    #[test]
    fn nothing_stored_reads_none() {
        let mut storage = Storage::new(MemoryStore::new());
        assert_eq!(storage.read_habits(), None);

        storage
            .backend_mut()
            .set(PRIMARY_KEY, r#"{"state":{"habits":[]},"version":1}"#)
            .unwrap();
        assert_eq!(storage.read_habits(), None);
    }

    #[test]
    fn non_list_habits_are_refused() {
        let mut storage = Storage::new(MemoryStore::new());
        assert!(!storage.write_raw_habits(json!({"name": "oops"})));
        assert_eq!(storage.backend().get(PRIMARY_KEY).unwrap(), None);
    }

    #[test]
    fn empty_list_is_written_but_not_verified() {
        let mut storage = Storage::new(MemoryStore::new());
        assert!(storage.write_habits(&sample(&["Physics"])));
        assert!(!storage.write_habits(&[]));
        assert_eq!(storage.key_status(PRIMARY_KEY), KeyStatus::Empty);
    }

    #[test]
    fn habit_writes_preserve_theme_and_unknown_fields() {
        let mut storage = Storage::new(MemoryStore::new());
        storage
            .backend_mut()
            .set(
                PRIMARY_KEY,
                r#"{"state":{"habits":[],"theme":"dark","language":"tr"},"version":1,"extra":true}"#,
            )
            .unwrap();

        assert!(storage.write_habits(&sample(&["Physics"])));
        let doc = storage.read_document().unwrap();
        assert_eq!(doc["state"]["theme"], json!("dark"));
        assert_eq!(doc["state"]["language"], json!("tr"));
        assert_eq!(doc["extra"], json!(true));
        assert_eq!(storage.read_theme(), Some(Theme::Dark));
    }

    #[test]
    fn theme_write_keeps_habits() {
        let mut storage = Storage::new(MemoryStore::new());
        let habits = sample(&["Physics"]);
        assert!(storage.write_habits(&habits));
        assert!(storage.write_theme(Theme::Dark));
        assert_eq!(storage.read_theme(), Some(Theme::Dark));
        assert_eq!(storage.read_habits(), Some(habits));
    }

    #[test]
    fn file_store_round_trips_and_repairs() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = Storage::new(FileStore::new(dir.path().join("data")));
        assert!(storage.is_available());

        let habits = sample(&["Physics", "Chemistry", "Biology"]);
        assert!(storage.write_habits(&habits));
        assert!(dir.path().join("data/habit-storage.json").exists());
        assert!(dir.path().join("data/habit-storage-backup.json").exists());

        std::fs::remove_file(dir.path().join("data/habit-storage.json")).unwrap();
        assert_eq!(storage.key_status(PRIMARY_KEY), KeyStatus::Missing);
        assert_eq!(storage.read_habits(), Some(habits));
        assert!(dir.path().join("data/habit-storage.json").exists());
    }
}
