use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use homestock_lib::config::Config;
use homestock_lib::db::open_sqlite_pool;
use homestock_lib::export::{build_document, encode_token, parse_document, write_backup_file};
use homestock_lib::import::{apply_import, ImportMode};
use homestock_lib::migrate::apply_migrations;
use homestock_lib::notify::{self, run_notification_job, NotifyOptions};
use homestock_lib::realtime::ChangeFeed;
use homestock_lib::{init_logging, server};

#[derive(Debug, Parser)]
#[command(name = "homestock", about = "Shared household supplies tracker", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API (the default).
    Serve,
    /// Apply pending schema migrations and exit.
    Migrate,
    /// Load a backup file into a household.
    Import {
        household: String,
        file: PathBuf,
        /// Delete categories and supplies that are not in the file.
        #[arg(long)]
        replace: bool,
    },
    /// Run the restock notification job once.
    Notify {
        household: String,
        /// Text the household's husband after creating notifications.
        #[arg(long)]
        send_message: bool,
    },
    /// Write a backup file, or print a share code with `--token`.
    Export {
        household: String,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[arg(long)]
        token: bool,
    },
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    let _guard = match init_logging(&config.log) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve);
    if let Err(err) = run(command, config).await {
        tracing::error!(target: "homestock", event = "command_failed", error = %format!("{err:#}"));
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

async fn run(command: Commands, config: Config) -> Result<()> {
    if let Commands::Serve = command {
        return server::serve(config).await;
    }

    let pool = open_sqlite_pool(&config.db_path).await?;
    apply_migrations(&pool).await.context("apply migrations")?;
    let feed = ChangeFeed::new();

    match command {
        Commands::Serve => {}
        Commands::Migrate => {
            println!("Database ready at {}", config.db_path.display());
        }
        Commands::Import {
            household,
            file,
            replace,
        } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("read {}", file.display()))?;
            let doc = parse_document(&text)?;
            let mode = if replace {
                ImportMode::Replace
            } else {
                ImportMode::Merge
            };
            let report = apply_import(&pool, &feed, &household, &doc, mode).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Notify {
            household,
            send_message,
        } => {
            let messenger = notify::messenger::from_config(&config.messenger);
            let outcome = run_notification_job(
                &pool,
                &feed,
                messenger.as_ref(),
                &household,
                NotifyOptions { send_message },
            )
            .await?;
            println!(
                "{}",
                json!({ "message": outcome.message(), "notificationsCreated": outcome.created() })
            );
        }
        Commands::Export {
            household,
            dir,
            token,
        } => {
            let doc = build_document(&pool, &household).await?;
            if token {
                println!("{}", encode_token(&doc)?);
            } else {
                let path = write_backup_file(&doc, &dir)?;
                println!("Backup written to {}", path.display());
            }
        }
    }

    pool.close().await;
    Ok(())
}
