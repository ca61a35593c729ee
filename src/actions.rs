use crate::config::Config;
use crate::error::{HbError, Result};
use crate::habit::{CountDirection, Habit, HabitDraft, HabitPatch};
use crate::lock::FileLock;
use crate::state::Theme;
use crate::storage::{FileStore, KeyStatus, KeyValueStore, Storage, BACKUP_KEY, PRIMARY_KEY};
use crate::store::HabitStore;

/// Initialize the tool: create the config file and data directory.
/// If `data_dir` is provided, store it in config. Otherwise use default.
pub fn init(data_dir: Option<&str>) -> Result<()> {
    Config::ensure_dir()?;

    let config_path = Config::config_path();
    if !config_path.exists() {
        let config = match data_dir {
            Some(d) => Config::with_data_dir(d),
            None => Config::default(),
        };
        config.save()?;
    } else if let Some(d) = data_dir {
        // Config exists but user is moving the data directory
        let mut config = Config::load()?;
        config.data_dir = d.to_string();
        config.save()?;
    }

    let config = Config::load()?;
    let dir = config.resolved_data_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(())
}

fn open_store(config: &Config) -> HabitStore<FileStore> {
    HabitStore::open(Storage::new(FileStore::new(config.resolved_data_dir())))
}

/// Run `f` against the on-disk store while holding the store lock. Opening
/// probes and may repair storage, so reads go through here too.
pub fn with_store<T>(f: impl FnOnce(&mut HabitStore<FileStore>, &Config) -> Result<T>) -> Result<T> {
    let config = Config::load()?;
    let _lock = FileLock::acquire()?;
    let mut store = open_store(&config);
    f(&mut store, &config)
}

pub fn add<S: KeyValueStore>(store: &mut HabitStore<S>, draft: &HabitDraft) -> Result<Habit> {
    if draft.name.trim().is_empty() {
        return Err(HbError::Other("habit name cannot be empty".to_string()));
    }
    let id = store
        .add_habit(draft)
        .ok_or_else(|| HbError::Other("habit was not added".to_string()))?;
    found(store.habit(&id), &id.to_string())
}

pub fn increment<S: KeyValueStore>(store: &mut HabitStore<S>, id: &str) -> Result<Habit> {
    let id = store.resolve(id)?;
    found(store.update_count(&id), &id.to_string())
}

pub fn reset<S: KeyValueStore>(store: &mut HabitStore<S>, id: &str) -> Result<Habit> {
    let id = store.resolve(id)?;
    found(store.reset_habit(&id), &id.to_string())
}

pub fn edit<S: KeyValueStore>(store: &mut HabitStore<S>, id: &str, patch: &HabitPatch) -> Result<Habit> {
    if patch.is_empty() {
        return Err(HbError::Other("nothing to change".to_string()));
    }
    let id = store.resolve(id)?;
    found(store.update_habit(&id, patch), &id.to_string())
}

/// Remove a habit, returning what was removed.
pub fn remove<S: KeyValueStore>(store: &mut HabitStore<S>, id: &str) -> Result<Habit> {
    let id = store.resolve(id)?;
    let habit = found(store.habit(&id), &id.to_string())?;
    store.delete_habit(&id);
    Ok(habit)
}

/// Set the theme, or flip it when `theme` is `None`.
pub fn theme<S: KeyValueStore>(store: &mut HabitStore<S>, theme: Option<Theme>) -> Theme {
    match theme {
        Some(theme) => {
            store.set_theme(theme);
            theme
        }
        None => store.toggle_theme(),
    }
}

fn found(habit: Option<&Habit>, id: &str) -> Result<Habit> {
    habit
        .cloned()
        .ok_or_else(|| HbError::HabitNotFound(id.to_string()))
}

/// One line per habit for plain-text output.
pub fn summary_line(habit: &Habit) -> String {
    let id = habit.id.to_string();
    let mut line = format!(
        "{:<8}  {:<20} {:>5}  streak {}",
        id.get(..8).unwrap_or(&id),
        habit.name,
        habit.count,
        habit.streak
    );
    if let Some(minutes) = habit.timer_minutes() {
        line.push_str(&format!("  timer {}m", minutes));
    }
    if habit.count_direction == CountDirection::Down || habit.count_amount > 1 {
        let sign = match habit.count_direction {
            CountDirection::Up => '+',
            CountDirection::Down => '-',
        };
        line.push_str(&format!("  step {}{}", sign, habit.count_amount));
    }
    if !habit.bg_color.is_empty() {
        line.push_str(&format!("  {}", habit.bg_color));
    }
    line
}

pub fn render_list(habits: &[Habit]) -> String {
    if habits.is_empty() {
        return "no habits yet".to_string();
    }
    habits
        .iter()
        .map(summary_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Storage health as shown by `hb doctor`.
#[derive(Debug)]
pub struct DoctorReport {
    pub available: bool,
    pub version: Option<u64>,
    pub primary: KeyStatus,
    pub backup: KeyStatus,
}

impl DoctorReport {
    pub fn collect<S: KeyValueStore>(storage: &mut Storage<S>) -> Self {
        Self {
            available: storage.is_available(),
            version: storage
                .read_document()
                .and_then(|doc| doc.get("version").and_then(|v| v.as_u64())),
            primary: storage.key_status(PRIMARY_KEY),
            backup: storage.key_status(BACKUP_KEY),
        }
    }

    pub fn render(&self) -> String {
        let version = self
            .version
            .map_or_else(|| "unknown".to_string(), |v| v.to_string());
        format!(
            "storage available: {}\ndocument version: {}\n{}: {}\n{}: {}",
            if self.available { "yes" } else { "no" },
            version,
            PRIMARY_KEY,
            describe_status(&self.primary),
            BACKUP_KEY,
            describe_status(&self.backup),
        )
    }
}

fn describe_status(status: &KeyStatus) -> String {
    match status {
        KeyStatus::Missing => "missing".to_string(),
        KeyStatus::Unreadable(e) => format!("unreadable ({})", e),
        KeyStatus::Corrupt(e) => format!("corrupt ({})", e),
        KeyStatus::Empty => "no habits".to_string(),
        KeyStatus::Habits(n) => format!("{} habits", n),
    }
}

/// The rendered habit list, read under the store lock.
pub fn list() -> Result<String> {
    with_store(|store, _| Ok(render_list(store.habits())))
}

pub fn doctor() -> Result<DoctorReport> {
    let config = Config::load()?;
    let _lock = FileLock::acquire()?;
    let mut storage = Storage::new(FileStore::new(config.resolved_data_dir()));
    Ok(DoctorReport::collect(&mut storage))
}
