use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::error::{StoreError, StoreResult};
use crate::metadata::{PKG_DESCRIPTION, PKG_NAME, PKG_VERSION};
use crate::storage::FileBackend;
use crate::types::{TaskPriority, TaskStatus};

#[derive(Parser, Debug, Clone)]
#[command(name = PKG_NAME)]
#[command(version = PKG_VERSION)]
#[command(about = PKG_DESCRIPTION, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Directory holding data.json (defaults to the platform data dir)
    #[arg(long, global = true, env = "LINEAR_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Reload interval for `watch`, in milliseconds
    #[arg(long, global = true, env = "LINEAR_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Skip creating sample data on first run
    #[arg(long, global = true, env = "LINEAR_NO_SEED", default_value_t = false)]
    pub no_seed: bool,
}

impl Settings {
    pub fn default_settings() -> Self {
        Self {
            data_dir: None,
            poll_interval_ms: 1000,
            no_seed: false,
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(StoreError::Config(
                "LINEAR_POLL_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        if let Some(dir) = &self.data_dir {
            if dir.as_os_str().is_empty() {
                return Err(StoreError::Config("LINEAR_DATA_DIR cannot be empty".to_string()));
            }
            if dir.is_file() {
                return Err(StoreError::Config(format!(
                    "LINEAR_DATA_DIR '{}' is a file, expected a directory",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    pub fn resolved_data_dir(&self) -> StoreResult<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => FileBackend::default_dir(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::default_settings()
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Work with issues
    #[command(subcommand)]
    Tasks(TaskCommand),
    /// Work with categories
    #[command(subcommand)]
    Categories(CategoryCommand),
    /// Sign in locally (creates a local user on first use)
    Login {
        username: String,
        /// Accepted for parity with the web form; never checked
        #[arg(long, default_value = "")]
        password: String,
    },
    /// Replace the local user
    Register {
        username: String,
        email: String,
        #[arg(long, default_value = "")]
        password: String,
    },
    /// Forget the local user
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Populate sample data if the store is empty
    Seed,
    /// Print the issue list and follow changes until interrupted
    Watch {
        #[arg(long)]
        category: Option<u64>,
    },
    /// Print version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
    /// List issues grouped by status
    List {
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        category: Option<u64>,
    },
    /// Show one issue
    Show { id: u64 },
    /// Create an issue
    Create(CreateTaskArgs),
    /// Change fields of an issue
    Update(UpdateTaskArgs),
    /// Delete an issue
    Delete {
        id: u64,
        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CreateTaskArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long, default_value_t = TaskStatus::Todo)]
    pub status: TaskStatus,
    #[arg(long)]
    pub priority: Option<TaskPriority>,
    /// Due date as YYYY-MM-DD
    #[arg(long)]
    pub due: Option<NaiveDate>,
    /// Category id
    #[arg(long)]
    pub category: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateTaskArgs {
    pub id: u64,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub status: Option<TaskStatus>,
    #[arg(long, conflicts_with = "clear_priority")]
    pub priority: Option<TaskPriority>,
    #[arg(long)]
    pub clear_priority: bool,
    /// Due date as YYYY-MM-DD
    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<NaiveDate>,
    #[arg(long)]
    pub clear_due: bool,
    /// Category id
    #[arg(long, conflicts_with = "clear_category")]
    pub category: Option<u64>,
    #[arg(long)]
    pub clear_category: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCommand {
    List,
    Create { name: String },
    Rename { id: u64, name: String },
    Delete { id: u64 },
}
