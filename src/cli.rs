//! CLI definitions for netsweep.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// netsweep CLI.
#[derive(Parser)]
#[command(name = "netsweep")]
#[command(about = "Module job runner and site-scoped scheduler for network discovery")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (default: config/netsweep.toml, then the
    /// user config directory; built-in defaults when neither exists)
    #[arg(short, long, global = true, env = "NETSWEEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Working directory; relative paths in the config resolve against it
    #[arg(short, long, global = true)]
    pub work_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler loop and job reaper until interrupted
    Serve,

    /// Module catalog commands
    Modules {
        #[command(subcommand)]
        action: ModulesAction,
    },

    /// Ad-hoc job commands
    Job {
        #[command(subcommand)]
        action: JobAction,
    },

    /// Schedule management commands
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
}

#[derive(Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum ModulesAction {
    /// List every module in the catalog
    List {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
pub(crate) enum JobAction {
    /// Run a module once, wait for it and print its record and log
    Run {
        /// Module ID
        module_id: String,

        /// Module parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,

        /// Site the module runs against
        #[arg(long)]
        site: Option<String>,

        /// Log lines to print after the record
        #[arg(long)]
        lines: Option<usize>,
    },

    /// Print the tail of a job log
    Log {
        /// Job ID
        job_id: String,

        /// Number of lines to show
        #[arg(long)]
        lines: Option<usize>,

        /// Delete the log after printing it
        #[arg(long)]
        delete: bool,
    },
}

#[derive(Subcommand)]
pub(crate) enum ScheduleAction {
    /// List schedules with their runtime state
    List {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Create or replace a schedule from a JSON file
    Add {
        /// Path to the schedule definition
        file: PathBuf,

        /// Only write if the stored version matches (0 = must not exist)
        #[arg(long)]
        expect_version: Option<u64>,
    },

    /// Delete a schedule
    Remove {
        /// Schedule ID
        schedule_id: String,

        /// Only delete if the stored version matches
        #[arg(long)]
        expect_version: Option<u64>,
    },

    /// Check a schedule without running it
    Validate {
        /// Schedule ID
        schedule_id: String,
    },

    /// Run a schedule now, in this process, and print the result
    RunNow {
        /// Schedule ID
        schedule_id: String,
    },
}
