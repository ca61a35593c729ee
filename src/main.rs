mod actions;
mod config;
mod error;
mod habit;
mod lock;
mod mcp;
mod parser;
mod state;
mod storage;
mod store;
mod timer;
mod tui;

use clap::{Parser, Subcommand};
use habit::{CountDirection, HabitDraft, HabitPatch};
use state::Theme;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "hb", about = "Habit and study tracker with streaks and timers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize hb: create config and data directory
    Init {
        /// Where habit data is stored (default: ~/.config/hb/data)
        #[arg(long)]
        data_dir: Option<String>,
    },

    /// Add a new habit: hb add <name>
    Add {
        /// Habit name
        name: Vec<String>,
        /// Short description
        #[arg(short, long)]
        description: Option<String>,
        /// Card color: palette name (mint, sky, ...) or #RRGGBB
        #[arg(long)]
        color: Option<String>,
        /// Countdown length, e.g. 25, 25m, 1h30m
        #[arg(long)]
        timer: Option<String>,
        /// Count down instead of up
        #[arg(long)]
        down: bool,
        /// Amount added or removed per increment
        #[arg(long)]
        step: Option<u32>,
    },

    /// List habits
    List,

    /// Increment a habit: hb inc <id>
    Inc {
        /// Habit ID or unique prefix
        id: String,
    },

    /// Set a habit's count back to zero
    Reset {
        /// Habit ID or unique prefix
        id: String,
    },

    /// Delete a habit
    Rm {
        /// Habit ID or unique prefix
        id: String,
    },

    /// Change a habit's attributes
    Edit {
        /// Habit ID or unique prefix
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
        /// Countdown length, or "off"
        #[arg(long)]
        timer: Option<String>,
        /// "up" or "down"
        #[arg(long)]
        direction: Option<String>,
        #[arg(long)]
        step: Option<u32>,
    },

    /// Replace all habits with the seed habits from config
    Defaults,

    /// Show or switch the theme: hb theme [light|dark]
    Theme {
        /// Omit to toggle
        theme: Option<String>,
    },

    /// Check the stored documents
    Doctor,

    /// Open interactive TUI
    Tui,

    /// Start MCP server (stdio transport)
    Mcp,
}

fn main() {
    let cli = Cli::parse();
    init_logging(matches!(cli.command, Commands::Tui));

    let result = match cli.command {
        Commands::Init { data_dir } => cmd_init(data_dir.as_deref()),
        Commands::Add {
            name,
            description,
            color,
            timer,
            down,
            step,
        } => cmd_add(&name.join(" "), description, color, timer, down, step),
        Commands::List => cmd_list(),
        Commands::Inc { id } => cmd_inc(&id),
        Commands::Reset { id } => cmd_reset(&id),
        Commands::Rm { id } => cmd_rm(&id),
        Commands::Edit {
            id,
            name,
            description,
            color,
            timer,
            direction,
            step,
        } => edit_patch(name, description, color, timer, direction, step)
            .and_then(|patch| cmd_edit(&id, &patch)),
        Commands::Defaults => cmd_defaults(),
        Commands::Theme { theme } => cmd_theme(theme.as_deref()),
        Commands::Doctor => cmd_doctor(),
        Commands::Tui => cmd_tui(),
        Commands::Mcp => cmd_mcp(),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// `HB_LOG` wins over the configured level. The TUI owns the terminal, so it
/// logs to a file instead of stderr.
fn init_logging(to_file: bool) {
    let level = config::Config::load()
        .map(|c| c.log_level)
        .unwrap_or_else(|_| "warn".to_string());
    let filter = EnvFilter::try_from_env("HB_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt().with_env_filter(filter).with_target(false);

    if !to_file {
        builder.with_writer(std::io::stderr).init();
        return;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config::Config::log_path());
    if let Ok(file) = file {
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    }
}

fn cmd_init(data_dir: Option<&str>) -> error::Result<()> {
    actions::init(data_dir)?;
    let config = config::Config::load()?;
    println!("initialized at {}", config::Config::base_dir().display());
    println!("data dir: {}", config.resolved_data_dir().display());
    Ok(())
}

fn cmd_add(
    name: &str,
    description: Option<String>,
    color: Option<String>,
    timer: Option<String>,
    down: bool,
    step: Option<u32>,
) -> error::Result<()> {
    if name.trim().is_empty() {
        return Err(error::HbError::Other("name cannot be empty".to_string()));
    }
    let draft = HabitDraft {
        name: name.to_string(),
        description,
        bg_color: color.as_deref().map(parser::parse_color).transpose()?,
        timer_duration: match timer.as_deref() {
            Some(t) => parser::parse_minutes(t)?,
            None => None,
        },
        count_direction: down.then_some(CountDirection::Down),
        count_amount: step,
    };
    let habit = actions::with_store(|store, _| actions::add(store, &draft))?;
    println!("created {}", habit.id);
    Ok(())
}

fn cmd_list() -> error::Result<()> {
    println!("{}", actions::list()?);
    Ok(())
}

fn cmd_inc(id: &str) -> error::Result<()> {
    let habit = actions::with_store(|store, _| actions::increment(store, id))?;
    println!("{} is at {} (streak {})", habit.name, habit.count, habit.streak);
    Ok(())
}

fn cmd_reset(id: &str) -> error::Result<()> {
    let habit = actions::with_store(|store, _| actions::reset(store, id))?;
    println!("reset {}", habit.name);
    Ok(())
}

fn cmd_rm(id: &str) -> error::Result<()> {
    let habit = actions::with_store(|store, _| actions::remove(store, id))?;
    println!("deleted {}", habit.name);
    Ok(())
}

fn edit_patch(
    name: Option<String>,
    description: Option<String>,
    color: Option<String>,
    timer: Option<String>,
    direction: Option<String>,
    step: Option<u32>,
) -> error::Result<HabitPatch> {
    Ok(HabitPatch {
        name,
        description,
        bg_color: color.as_deref().map(parser::parse_color).transpose()?,
        timer_duration: timer.as_deref().map(parser::parse_minutes).transpose()?,
        count_direction: direction.as_deref().map(parser::parse_direction).transpose()?,
        count_amount: step,
    })
}

fn cmd_edit(id: &str, patch: &HabitPatch) -> error::Result<()> {
    let habit = actions::with_store(|store, _| actions::edit(store, id, patch))?;
    println!("{}", actions::summary_line(&habit));
    Ok(())
}

fn cmd_defaults() -> error::Result<()> {
    let count = actions::with_store(|store, config| {
        store.reset_to_defaults(&config.seeds);
        Ok(store.habits().len())
    })?;
    println!("restored {} default habits", count);
    Ok(())
}

fn cmd_theme(theme: Option<&str>) -> error::Result<()> {
    let theme = match theme {
        Some("light") => Some(Theme::Light),
        Some("dark") => Some(Theme::Dark),
        Some(other) => {
            return Err(error::HbError::Parse(format!(
                "theme must be 'light' or 'dark', got {:?}",
                other
            )))
        }
        None => None,
    };
    let theme = actions::with_store(|store, _| Ok(actions::theme(store, theme)))?;
    println!("theme: {}", theme.as_str());
    Ok(())
}

fn cmd_doctor() -> error::Result<()> {
    let report = actions::doctor()?;
    println!("{}", report.render());
    Ok(())
}

fn cmd_tui() -> error::Result<()> {
    tui::run()
}

fn cmd_mcp() -> error::Result<()> {
    mcp::run_mcp_server()
}
