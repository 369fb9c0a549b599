//! JurisDesk Backup - Command Line Entry Point
//!
//! Headless access to the backup subsystem: create, list, restore and
//! delete encrypted backups, and inspect or change the backup settings.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use jurisdesk_core::BackupConfigUpdate;
use jurisdesk_desktop::commands;
use jurisdesk_desktop::storage::Database;
use jurisdesk_desktop::utils::paths::DATABASE_FILE_NAME;
use jurisdesk_desktop::{AppState, CommandResponse};
use tracing_subscriber::EnvFilter;

/// Encrypted backups of the JurisDesk database
#[derive(Parser, Debug)]
#[command(name = "jurisdesk-backup")]
#[command(about = "Create, list and restore encrypted JurisDesk backups")]
#[command(version)]
struct Cli {
    /// Application data root (defaults to the platform data directory)
    #[arg(long, env = "JURISDESK_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Backup password
    #[arg(long, env = "JURISDESK_BACKUP_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a backup now
    Backup,
    /// Replace the database with the content of a backup
    Restore {
        /// Backup filename, as printed by `list`
        file: String,
    },
    /// List backups, newest first
    List,
    /// Delete a backup
    Delete {
        /// Backup filename, as printed by `list`
        file: String,
    },
    /// Show or change backup settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the current settings
    Show,
    /// Change one or more settings
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        /// Custom backup directory inside the data root; "" resets it
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        max_backups: Option<u32>,
        #[arg(long)]
        debounce_ms: Option<u64>,
        #[arg(long)]
        min_interval_ms: Option<u64>,
    },
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::new();
    match cli.data_dir {
        Some(root) => {
            let db = Database::open(&root.join(DATABASE_FILE_NAME))
                .with_context(|| format!("Failed to open database in {}", root.display()))?;
            state.initialize_with(db, root).await?;
        }
        None => state.initialize().await?,
    }

    if let Some(password) = cli.password.filter(|p| !p.is_empty()) {
        state.secrets().set_password(password);
    }

    match cli.command {
        Command::Backup => {
            let created = into_result(commands::run_backup_now(&state, None).await)?;
            match created {
                Some(info) => println!("Created {} ({} bytes)", info.path.display(), info.size),
                None => {
                    println!("No backup created: backups are disabled or no password was given")
                }
            }
        }
        Command::Restore { file } => {
            let report = into_result(commands::restore_backup(&state, file, None).await)?;
            println!(
                "Restored {} rows from {} (taken {})",
                report.import.total_rows(),
                report.filename,
                report.snapshot_created_at.to_rfc3339()
            );
            if report.import.skipped_sensitive > 0 {
                println!(
                    "Ignored {} credential setting(s) found in the backup",
                    report.import.skipped_sensitive
                );
            }
        }
        Command::List => {
            let backups = into_result(commands::list_backups(&state).await)?;
            if backups.is_empty() {
                println!("No backups found");
            }
            for info in backups {
                println!(
                    "{}  {:>10}  {}",
                    info.created_at.format("%Y-%m-%d %H:%M:%S"),
                    info.size,
                    info.filename
                );
            }
        }
        Command::Delete { file } => {
            into_result(commands::delete_backup(&state, file.clone()).await)?;
            println!("Deleted {}", file);
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                let status = into_result(commands::get_backup_config(&state).await)?;
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            ConfigAction::Set {
                enabled,
                path,
                max_backups,
                debounce_ms,
                min_interval_ms,
            } => {
                let update = BackupConfigUpdate {
                    enabled,
                    backup_path: path,
                    max_backups,
                    debounce_ms,
                    min_interval_ms,
                };
                let config = into_result(commands::update_backup_config(&state, update).await)?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },
    }

    Ok(())
}

fn into_result<T>(response: Result<CommandResponse<T>, String>) -> anyhow::Result<T> {
    let response = response.map_err(|e| anyhow!(e))?;
    match (response.success, response.data) {
        (true, Some(data)) => Ok(data),
        _ => Err(anyhow!(
            "{} [{}]",
            response.error.unwrap_or_else(|| "unknown error".to_string()),
            response.error_code.unwrap_or_else(|| "internal".to_string())
        )),
    }
}
