use crate::error::{HbError, Result};
use crate::habit::{Habit, HabitDraft, HabitId, HabitPatch};
use crate::state::{reconcile, AppState, Theme};
use crate::storage::{KeyValueStore, Storage};
use chrono::{DateTime, Local, Utc};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&AppState)>;

/// The habit list and theme, persisted through [`Storage`] after every change.
///
/// Memory is authoritative for the session: a failed write is logged and the
/// in-memory state is kept as is. Operations on an unknown id change nothing,
/// so they neither persist nor notify subscribers.
pub struct HabitStore<S> {
    storage: Storage<S>,
    state: AppState,
    persist: bool,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl<S: KeyValueStore> HabitStore<S> {
    pub fn open(storage: Storage<S>) -> Self {
        Self::open_with_defaults(storage, None)
    }

    /// Load persisted habits, falling back to `defaults` when storage has none.
    pub fn open_with_defaults(mut storage: Storage<S>, defaults: Option<Vec<Habit>>) -> Self {
        let persist = storage.is_available();
        if !persist {
            warn!("storage unavailable, running in memory only");
        }

        let persisted = if persist { storage.read_habits() } else { None };
        let theme = if persist { storage.read_theme() } else { None };
        let habits = reconcile(persisted, defaults);
        debug!(count = habits.len(), "habit store initialized");

        Self {
            storage,
            state: AppState {
                habits,
                theme: theme.unwrap_or_default(),
            },
            persist,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn habits(&self) -> &[Habit] {
        &self.state.habits
    }

    pub fn habit(&self, id: &HabitId) -> Option<&Habit> {
        self.state.habits.iter().find(|h| h.id == *id)
    }

    pub fn theme(&self) -> Theme {
        self.state.theme
    }

    pub fn is_persistent(&self) -> bool {
        self.persist
    }

    /// Resolve a full id or a unique prefix of one.
    pub fn resolve(&self, prefix: &str) -> Result<HabitId> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Err(HbError::HabitNotFound(prefix));
        }
        if let Some(habit) = self
            .state
            .habits
            .iter()
            .find(|h| h.id.to_string().to_lowercase() == prefix)
        {
            return Ok(habit.id.clone());
        }
        let mut matches = self
            .state
            .habits
            .iter()
            .filter(|h| h.id.to_string().to_lowercase().starts_with(&prefix));
        match (matches.next(), matches.next()) {
            (Some(habit), None) => Ok(habit.id.clone()),
            (None, _) => Err(HbError::HabitNotFound(prefix)),
            (Some(_), Some(_)) => Err(HbError::AmbiguousId(prefix)),
        }
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&AppState) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscribers.retain(|(sub, _)| *sub != id);
    }

    pub fn add_habit(&mut self, draft: &HabitDraft) -> Option<HabitId> {
        let Some(habit) = Habit::from_draft(draft, Utc::now()) else {
            debug!("ignoring habit draft with an empty name");
            return None;
        };
        let id = habit.id.clone();
        self.state.habits.push(habit);
        self.commit_habits();
        Some(id)
    }

    pub fn delete_habit(&mut self, id: &HabitId) -> bool {
        let before = self.state.habits.len();
        self.state.habits.retain(|h| h.id != *id);
        if self.state.habits.len() == before {
            debug!(%id, "no habit to delete");
            return false;
        }
        self.commit_habits();
        true
    }

    pub fn update_count(&mut self, id: &HabitId) -> Option<&Habit> {
        self.update_count_at(id, Local::now())
    }

    /// Increment as though the current time were `now`.
    pub fn update_count_at(&mut self, id: &HabitId, now: DateTime<Local>) -> Option<&Habit> {
        self.habit_mut(id)?.record_increment(now);
        self.commit_habits();
        self.habit(id)
    }

    pub fn reset_habit(&mut self, id: &HabitId) -> Option<&Habit> {
        self.habit_mut(id)?.count = 0;
        self.commit_habits();
        self.habit(id)
    }

    pub fn update_habit(&mut self, id: &HabitId, patch: &HabitPatch) -> Option<&Habit> {
        self.habit_mut(id)?.apply(patch);
        self.commit_habits();
        self.habit(id)
    }

    /// Replace every habit with fresh ones built from `seeds`.
    pub fn reset_to_defaults(&mut self, seeds: &[HabitDraft]) {
        let now = Utc::now();
        self.state.habits = seeds
            .iter()
            .filter_map(|draft| Habit::from_draft(draft, now))
            .collect();
        self.commit_habits();
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.state.theme = theme;
        if self.persist && !self.storage.write_theme(theme) {
            warn!(theme = theme.as_str(), "failed to persist theme");
        }
        self.notify();
    }

    pub fn toggle_theme(&mut self) -> Theme {
        let theme = self.state.theme.toggled();
        self.set_theme(theme);
        theme
    }

    fn habit_mut(&mut self, id: &HabitId) -> Option<&mut Habit> {
        self.state.habits.iter_mut().find(|h| h.id == *id)
    }

    fn commit_habits(&mut self) {
        if self.persist && !self.storage.write_habits(&self.state.habits) {
            warn!(count = self.state.habits.len(), "habits were not persisted");
        }
        self.notify();
    }

    fn notify(&mut self) {
        for (_, callback) in &mut self.subscribers {
            callback(&self.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habit::{CountDirection, HistoryEntry};
    use crate::storage::{FileStore, MemoryStore, BACKUP_KEY, PRIMARY_KEY};
    use chrono::{NaiveDate, TimeZone};
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    fn store() -> HabitStore<MemoryStore> {
        HabitStore::open(Storage::new(MemoryStore::new()))
    }

    fn noon(y: i32, m: u32, d: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn counted(store: &mut HabitStore<MemoryStore>, direction: CountDirection, amount: u32, count: i64) -> HabitId {
        let id = store
            .add_habit(&HabitDraft {
                count_direction: Some(direction),
                count_amount: Some(amount),
                ..HabitDraft::named("Counter")
            })
            .unwrap();
        store.habit_mut(&id).unwrap().count = count;
        id
    }

    #[test]
    fn starts_empty_without_persisted_data() {
        let store = store();
        assert!(store.habits().is_empty());
        assert_eq!(store.theme(), Theme::Light);
        assert!(store.is_persistent());
    }

    #[test]
    fn defaults_used_only_when_nothing_persisted() {
        let seed = vec![Habit::from_draft(&HabitDraft::named("Physics"), Utc::now()).unwrap()];
        let store = HabitStore::open_with_defaults(Storage::new(MemoryStore::new()), Some(seed.clone()));
        assert_eq!(store.habits(), seed.as_slice());
    }

    #[test]
    fn adds_get_distinct_ids() {
        let mut store = store();
        let names = ["Physics", "Chemistry", "Biology", "Reading", "Running"];
        let ids: HashSet<_> = names
            .iter()
            .filter_map(|n| store.add_habit(&HabitDraft::named(*n)))
            .collect();
        assert_eq!(store.habits().len(), names.len());
        assert_eq!(ids.len(), names.len());
    }

    #[test]
    fn blank_name_is_ignored() {
        let mut store = store();
        store.add_habit(&HabitDraft::named("Physics"));
        assert_eq!(store.add_habit(&HabitDraft::named("  ")), None);
        assert_eq!(store.habits().len(), 1);
    }

    #[test]
    fn increments_follow_direction_and_amount() {
        let mut store = store();
        let up = counted(&mut store, CountDirection::Up, 3, 5);
        let down = counted(&mut store, CountDirection::Down, 2, 5);
        assert_eq!(store.update_count(&up).unwrap().count, 8);
        assert_eq!(store.update_count(&down).unwrap().count, 3);
    }

    #[test]
    fn two_increments_one_day_one_entry() {
        let mut store = store();
        let id = counted(&mut store, CountDirection::Up, 1, 0);
        store.update_count(&id);
        let habit = store.update_count(&id).unwrap();
        assert_eq!(habit.history.len(), 1);
        assert_eq!(habit.history[0].count, 2);
        assert_eq!(habit.history[0].date, Local::now().date_naive());
    }

    #[test]
    fn reset_keeps_history_and_streak() {
        let mut store = store();
        let id = counted(&mut store, CountDirection::Up, 1, 0);
        store.update_count(&id);
        let before = store.habit(&id).unwrap().clone();

        let after = store.reset_habit(&id).unwrap();
        assert_eq!(after.count, 0);
        assert_eq!(after.history, before.history);
        assert_eq!(after.streak, before.streak);
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let mut store = store();
        store.add_habit(&HabitDraft::named("Physics"));
        let stranger = HabitId::new();
        let before = store.habits().to_vec();

        assert!(!store.delete_habit(&stranger));
        assert!(store.update_count(&stranger).is_none());
        assert!(store.reset_habit(&stranger).is_none());
        assert!(store.update_habit(&stranger, &HabitPatch::default()).is_none());
        assert_eq!(store.habits(), before.as_slice());
    }

    #[test]
    fn unknown_ids_do_not_notify_or_write() {
        let mut store = store();
        store.add_habit(&HabitDraft::named("Physics"));
        let seen = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&seen);
        store.subscribe(move |_| *sink.borrow_mut() += 1);
        store.storage.backend_mut().remove(PRIMARY_KEY).unwrap();

        let stranger = HabitId::new();
        store.delete_habit(&stranger);
        store.update_count(&stranger);
        store.reset_habit(&stranger);
        store.update_habit(&stranger, &HabitPatch::default());

        assert_eq!(*seen.borrow(), 0);
        assert_eq!(store.storage.backend().get(PRIMARY_KEY).unwrap(), None);
    }

    #[test]
    fn reopen_after_lost_primary_keeps_theme() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HabitStore::open(Storage::new(FileStore::new(dir.path())));
        store.add_habit(&HabitDraft::named("Physics"));
        store.set_theme(Theme::Dark);
        drop(store);

        std::fs::remove_file(dir.path().join("habit-storage.json")).unwrap();
        let reopened = HabitStore::open(Storage::new(FileStore::new(dir.path())));
        assert_eq!(reopened.habits().len(), 1);
        assert_eq!(reopened.theme(), Theme::Dark);
    }

    #[test]
    fn numeric_ids_from_stored_document_survive_mutation() {
        let mut storage = Storage::new(MemoryStore::new());
        let doc = r#"{"state":{"habits":[{"id":1700000000000,"name":"Physics","textColor":"","count":2,
            "createdAt":"2023-11-14T22:13:20.000Z","lastUpdated":"2023-11-14T22:13:20.000Z"}],
            "theme":"dark"},"version":1}"#;
        storage.backend_mut().set(PRIMARY_KEY, doc).unwrap();
        storage.backend_mut().set(BACKUP_KEY, doc).unwrap();

        let mut store = HabitStore::open(storage);
        assert_eq!(store.habits().len(), 1);
        assert_eq!(store.theme(), Theme::Dark);
        store.add_habit(&HabitDraft::named("Chemistry"));
        assert_eq!(store.habits().len(), 2);

        let id = store.resolve("1700000000000").unwrap();
        assert_eq!(id, HabitId::Number(1_700_000_000_000));
        assert_eq!(store.update_count(&id).unwrap().count, 3);

        let backup = store.storage.backend().get(BACKUP_KEY).unwrap().unwrap();
        assert!(backup.contains("\"id\":1700000000000"));
        assert!(backup.contains("Physics"));
        assert!(backup.contains("textColor"));
    }

    #[test]
    fn delete_removes_habit() {
        let mut store = store();
        let id = store.add_habit(&HabitDraft::named("Physics")).unwrap();
        store.add_habit(&HabitDraft::named("Chemistry"));
        assert!(store.delete_habit(&id));
        assert_eq!(store.habits().len(), 1);
        assert!(store.habit(&id).is_none());
    }

    #[test]
    fn streak_extends_after_yesterday_and_holds_after_gap() {
        let mut store = store();
        let id = counted(&mut store, CountDirection::Up, 1, 1);
        {
            let habit = store.habit_mut(&id).unwrap();
            habit.streak = 1;
            habit.history = vec![HistoryEntry {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                count: 1,
            }];
        }
        let snapshot = store.habit(&id).unwrap().clone();

        assert_eq!(store.update_count_at(&id, noon(2024, 1, 2)).unwrap().streak, 2);

        *store.habit_mut(&id).unwrap() = snapshot;
        assert_eq!(store.update_count_at(&id, noon(2024, 1, 5)).unwrap().streak, 1);
    }

    #[test]
    fn update_habit_shallow_merges() {
        let mut store = store();
        let id = store.add_habit(&HabitDraft::named("Physics")).unwrap();
        let patch = HabitPatch {
            bg_color: Some("#FCA5A5".to_string()),
            ..Default::default()
        };
        let habit = store.update_habit(&id, &patch).unwrap();
        assert_eq!(habit.bg_color, "#FCA5A5");
        assert_eq!(habit.name, "Physics");
    }

    #[test]
    fn reset_to_defaults_replaces_list() {
        let mut store = store();
        store.add_habit(&HabitDraft::named("Old"));
        store.reset_to_defaults(&[HabitDraft::named("Physics"), HabitDraft::named("Biology")]);
        let names: Vec<_> = store.habits().iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["Physics", "Biology"]);

        store.reset_to_defaults(&[]);
        assert!(store.habits().is_empty());
    }

    #[test]
    fn mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HabitStore::open(Storage::new(FileStore::new(dir.path())));
        let id = store.add_habit(&HabitDraft::named("Physics")).unwrap();
        store.update_count(&id);
        store.toggle_theme();
        let expected = store.state().clone();
        drop(store);

        let reopened = HabitStore::open(Storage::new(FileStore::new(dir.path())));
        assert_eq!(reopened.state(), &expected);
        assert_eq!(reopened.theme(), Theme::Dark);
    }

    #[test]
    fn unavailable_storage_keeps_memory_state() {
        let mut store = HabitStore::open(Storage::new(MemoryStore::unavailable()));
        assert!(!store.is_persistent());
        let id = store.add_habit(&HabitDraft::named("Physics")).unwrap();
        assert_eq!(store.update_count(&id).unwrap().count, 1);
        assert!(store.storage.backend().get(PRIMARY_KEY).is_err());
    }

    #[test]
    fn subscribers_see_each_change_until_unsubscribed() {
        let mut store = store();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = store.subscribe(move |state| sink.borrow_mut().push(state.habits.len()));

        store.add_habit(&HabitDraft::named("Physics"));
        store.add_habit(&HabitDraft::named("Chemistry"));
        store.unsubscribe(sub);
        store.add_habit(&HabitDraft::named("Biology"));

        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn resolves_unique_prefixes() {
        let mut store = store();
        let id = store.add_habit(&HabitDraft::named("Physics")).unwrap();
        let full = id.to_string();
        assert_eq!(store.resolve(&full).unwrap(), id);
        assert_eq!(store.resolve(&full[..8]).unwrap(), id);
        assert_eq!(store.resolve(&full[..8].to_uppercase()).unwrap(), id);
        assert!(matches!(store.resolve("zzzz"), Err(HbError::HabitNotFound(_))));

        let mut other = Habit::from_draft(&HabitDraft::named("Short"), Utc::now()).unwrap();
        other.id = HabitId::Number(17);
        let mut longer = other.clone();
        longer.id = HabitId::Number(170);
        store.state.habits.extend([other, longer]);
        assert_eq!(store.resolve("17").unwrap(), HabitId::Number(17));
        assert!(matches!(store.resolve("1"), Err(HbError::AmbiguousId(_))));
    }
}
