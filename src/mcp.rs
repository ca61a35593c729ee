use crate::actions;
use crate::error::HbError;
use crate::habit::{HabitDraft, HabitPatch};
use crate::parser;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::schemars::JsonSchema;
use rmcp::{tool, tool_handler, tool_router, ServerHandler, ServiceExt};
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddHabitParams {
    /// Habit name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Card color: palette name or #RRGGBB
    pub color: Option<String>,
    /// Countdown length in minutes
    pub timer_minutes: Option<u32>,
    /// "up" (default) or "down"
    pub direction: Option<String>,
    /// Step per increment (default 1)
    pub step: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct HabitIdParams {
    /// Habit ID or unique prefix
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateHabitParams {
    /// Habit ID or unique prefix
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Card color: palette name or #RRGGBB
    pub color: Option<String>,
    /// Countdown length, e.g. "25m", or "off"
    pub timer: Option<String>,
    /// "up" or "down"
    pub direction: Option<String>,
    pub step: Option<u32>,
}

#[derive(Clone)]
pub struct HbMcpServer {
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl HbMcpServer {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }

    /// List all habits with their counts, streaks and timers.
    #[tool(description = "List all habits with their counts, streaks and timers.")]
    fn list_habits(&self) -> String {
        match actions::list() {
            Ok(list) => list,
            Err(e) => format!("Error: {}", e),
        }
    }

    /// Create a new habit. Returns the assigned habit ID.
    #[tool(description = "Create a new habit. Returns the assigned habit ID.")]
    fn add_habit(&self, Parameters(params): Parameters<AddHabitParams>) -> String {
        let draft = match draft_from(params) {
            Ok(draft) => draft,
            Err(e) => return format!("Error: {}", e),
        };
        match actions::with_store(|store, _| actions::add(store, &draft)) {
            Ok(habit) => format!("Created habit: {}", habit.id),
            Err(e) => format!("Error: {}", e),
        }
    }

    /// Increment a habit by its step and update its streak.
    #[tool(description = "Increment a habit by its step and update its streak.")]
    fn increment_habit(&self, Parameters(params): Parameters<HabitIdParams>) -> String {
        match actions::with_store(|store, _| actions::increment(store, &params.id)) {
            Ok(habit) => format!("{} is at {} (streak {})", habit.name, habit.count, habit.streak),
            Err(e) => format!("Error: {}", e),
        }
    }

    /// Reset a habit's count to zero. History and streak are kept.
    #[tool(description = "Reset a habit's count to zero. History and streak are kept.")]
    fn reset_habit(&self, Parameters(params): Parameters<HabitIdParams>) -> String {
        match actions::with_store(|store, _| actions::reset(store, &params.id)) {
            Ok(habit) => format!("Reset habit: {}", habit.name),
            Err(e) => format!("Error: {}", e),
        }
    }

    /// Delete a habit by its ID.
    #[tool(description = "Delete a habit by its ID.")]
    fn delete_habit(&self, Parameters(params): Parameters<HabitIdParams>) -> String {
        match actions::with_store(|store, _| actions::remove(store, &params.id)) {
            Ok(habit) => format!("Deleted habit: {}", habit.name),
            Err(e) => format!("Error: {}", e),
        }
    }

    /// Change a habit's name, description, color, timer, direction or step.
    #[tool(description = "Change a habit's name, description, color, timer, direction or step.")]
    fn update_habit(&self, Parameters(params): Parameters<UpdateHabitParams>) -> String {
        let id = params.id.clone();
        let patch = match patch_from(params) {
            Ok(patch) => patch,
            Err(e) => return format!("Error: {}", e),
        };
        match actions::with_store(|store, _| actions::edit(store, &id, &patch)) {
            Ok(habit) => actions::summary_line(&habit),
            Err(e) => format!("Error: {}", e),
        }
    }
}

fn draft_from(params: AddHabitParams) -> Result<HabitDraft, HbError> {
    Ok(HabitDraft {
        name: params.name,
        description: params.description,
        bg_color: params.color.as_deref().map(parser::parse_color).transpose()?,
        timer_duration: params.timer_minutes,
        count_direction: params.direction.as_deref().map(parser::parse_direction).transpose()?,
        count_amount: params.step,
    })
}

fn patch_from(params: UpdateHabitParams) -> Result<HabitPatch, HbError> {
    Ok(HabitPatch {
        name: params.name,
        description: params.description,
        bg_color: params.color.as_deref().map(parser::parse_color).transpose()?,
        timer_duration: params.timer.as_deref().map(parser::parse_minutes).transpose()?,
        count_direction: params.direction.as_deref().map(parser::parse_direction).transpose()?,
        count_amount: params.step,
    })
}

#[tool_handler]
impl ServerHandler for HbMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: "hb".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Habit tracker. Use list_habits to see habits and IDs, add_habit to create one, increment_habit to count progress, reset_habit and delete_habit to manage them.".to_string(),
            ),
        }
    }
}

pub fn run_mcp_server() -> crate::error::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| HbError::Other(format!("failed to build tokio runtime: {}", e)))?
        .block_on(async {
            let server = HbMcpServer::new();
            let transport = rmcp::transport::io::stdio();
            tracing::info!("mcp server starting on stdio");
            let running = server
                .serve(transport)
                .await
                .map_err(|e| HbError::Other(format!("MCP server error: {}", e)))?;
            running
                .waiting()
                .await
                .map_err(|e| HbError::Other(format!("MCP server error: {}", e)))?;
            Ok(())
        })
}
