use crate::error::{HbError, Result};
use crate::habit::HabitDraft;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Habits created by `hb defaults`.
    #[serde(default, rename = "seed")]
    pub seeds: Vec<HabitDraft>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    pub fn with_data_dir(data_dir: &str) -> Self {
        Self {
            data_dir: data_dir.to_string(),
            ..Self::default()
        }
    }

    /// `$HB_HOME` if set, otherwise `~/.config/hb`.
    pub fn base_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HB_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join(".config")
            .join("hb")
    }

    pub fn config_path() -> PathBuf {
        Self::base_dir().join("config.toml")
    }

    /// Resolve the data directory from config. Expands ~ to home dir.
    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.data_dir)
    }

    pub fn lock_path() -> PathBuf {
        Self::base_dir().join("lock")
    }

    pub fn log_path() -> PathBuf {
        Self::base_dir().join("hb.log")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Err(HbError::NotInitialized);
        }
        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content).map_err(|e| HbError::Config(e.to_string()))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        let content = toml::to_string_pretty(self).map_err(|e| HbError::Config(e.to_string()))?;
        atomic_write(&path, content.as_bytes())
    }

    pub fn ensure_dir() -> Result<()> {
        let dir = Self::base_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: Self::base_dir().join("data").to_string_lossy().into_owned(),
            log_level: default_log_level(),
            seeds: default_seeds(),
        }
    }
}

fn default_seeds() -> Vec<HabitDraft> {
    [
        ("Physics", "Study physics", "#F9A8D4"),
        ("Chemistry", "Study chemistry", "#C4B5FD"),
        ("Biology", "Study biology", "#BEF264"),
    ]
    .into_iter()
    .map(|(name, description, color)| HabitDraft {
        description: Some(description.to_string()),
        bg_color: Some(color.to_string()),
        timer_duration: Some(60),
        ..HabitDraft::named(name)
    })
    .collect()
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    use std::io::Write;

    let dir = path.parent().ok_or_else(|| {
        HbError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| HbError::Io(e.error))?;
    Ok(())
}
