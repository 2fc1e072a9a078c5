use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use recall::{cache::MemoryCache, config::Config, service::ReviewService, storage::SqliteProgressStore};
use recall_core::progress::{Grade, ItemProgress};
use recall_core::review::{review_error_to_exit_code, ReviewError};

/// Recall - Spaced-repetition review scheduler
#[derive(Parser, Debug)]
#[command(name = "recall")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, env = "SQLITE_PATH")]
    sqlite_path: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grade one review of an item
    Grade {
        #[arg(long)]
        learner: Uuid,
        #[arg(long)]
        item: Uuid,
        /// 0-3 or one of failed, hard, good, easy
        #[arg(long)]
        grade: Grade,
    },
    /// List items due for review now
    Due {
        #[arg(long)]
        learner: Uuid,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show a learner's review statistics
    Stats {
        #[arg(long)]
        learner: Uuid,
    },
    /// List every item of a learner with its mastery and accuracy
    Progress {
        #[arg(long)]
        learner: Uuid,
    },
    /// Show the current state of one item
    Show {
        #[arg(long)]
        learner: Uuid,
        #[arg(long)]
        item: Uuid,
    },
    /// Show the review history of one item
    History {
        #[arg(long)]
        learner: Uuid,
        #[arg(long)]
        item: Uuid,
    },
    /// Manage study sessions
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Open a study session for a learner
    Start {
        #[arg(long)]
        learner: Uuid,
    },
    /// Grade one review inside an open session
    Grade {
        #[arg(long)]
        session: Uuid,
        #[arg(long)]
        item: Uuid,
        /// 0-3 or one of failed, hard, good, easy
        #[arg(long)]
        grade: Grade,
    },
    /// Close a session and print its summary
    Finish {
        #[arg(long)]
        session: Uuid,
    },
    /// Print the summary of a session so far
    Show {
        #[arg(long)]
        session: Uuid,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recall=debug".into()),
        )
        .with(
            cli.log_json
                .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!cli.log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<ReviewError>()
                .map_or(1, review_error_to_exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env();
    let sqlite_path = cli.sqlite_path.unwrap_or_else(|| config.sqlite_path.clone());

    tracing::debug!(path = %sqlite_path, "opening progress store");
    let store = Arc::new(
        SqliteProgressStore::new(&sqlite_path)
            .await
            .map_err(ReviewError::from)?,
    );
    let cache = Arc::new(MemoryCache::new(config.cache_max_entries));
    let _purger = cache.spawn_purger(config.cache_ttl().max(Duration::from_secs(1)));
    let service = ReviewService::new(store, Arc::clone(&cache), config.review_settings());

    let now = Utc::now();
    match cli.command {
        Command::Grade {
            learner,
            item,
            grade,
        } => {
            let state = service
                .grade_review(learner, item, i64::from(grade.score()), now)
                .await?;
            print_json(&state)?;
        }
        Command::Due { learner, limit } => {
            let due: Vec<ItemProgress> = service
                .get_due_items(learner, now, limit)
                .await?
                .map(ItemProgress::from)
                .collect();
            print_json(&due)?;
        }
        Command::Stats { learner } => {
            let stats = service.learner_stats(learner, now).await?;
            print_json(&serde_json::json!({
                "stats": stats,
                "accuracy": stats.accuracy(),
            }))?;
        }
        Command::Progress { learner } => {
            print_json(&service.learner_progress(learner).await?)?;
        }
        Command::Show { learner, item } => {
            let state = service.get_state(learner, item).await?;
            print_json(&ItemProgress::from(state))?;
        }
        Command::History { learner, item } => {
            let history = service.review_history(learner, item).await?;
            print_json(&history)?;
        }
        Command::Session { action } => match action {
            SessionCommand::Start { learner } => {
                print_json(&service.start_session(learner, now).await?)?;
            }
            SessionCommand::Grade {
                session,
                item,
                grade,
            } => {
                let state = service
                    .grade_in_session(session, item, i64::from(grade.score()), now)
                    .await?;
                print_json(&state)?;
            }
            SessionCommand::Finish { session } => {
                print_json(&service.finish_session(session, now).await?)?;
            }
            SessionCommand::Show { session } => {
                print_json(&service.session_summary(session).await?)?;
            }
        },
    }

    tracing::debug!(stats = ?cache.stats().await, "cache usage");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
