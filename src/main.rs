use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "questlog")]
#[command(about = "Progression & rewards engine - XP, levels, streaks, quests and a reward store")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.questlog/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the progress database (defaults to ~/.questlog/progress.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the database
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Load quests, challenges and reward items from a TOML catalog
    ImportCatalog {
        /// Catalog file ([[quest]], [[challenge]], [[reward_item]])
        file: PathBuf,
    },

    /// Award XP once per idempotency key
    Award {
        user: String,
        amount: i64,
        /// Why the XP was granted
        #[arg(short, long)]
        reason: String,
        /// Replaying the same key awards nothing
        #[arg(short, long)]
        key: String,
    },

    /// Record a login (login streak + daily login XP)
    Login {
        user: String,
        /// Login time, RFC 3339 (defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Record activity for a streak type
    Activity {
        user: String,
        /// Streak type, e.g. "learning"
        #[arg(long, default_value = "learning")]
        streak: String,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Start, complete or abandon a quest
    Quest {
        #[command(subcommand)]
        action: QuestAction,
    },

    /// Join or complete a challenge
    Challenge {
        #[command(subcommand)]
        action: ChallengeAction,
    },

    /// Buy a reward item with spendable XP
    Purchase { user: String, item: String },

    /// Show a user's XP, level, streaks, badges and rank
    Status { user: String },

    /// Show the leaderboard
    Leaderboard {
        /// Number of rows (global scope)
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
        /// Rank only these users (comma separated)
        #[arg(long, value_delimiter = ',')]
        users: Vec<String>,
    },

    /// Show a user's XP ledger, quests, challenges and redemptions
    History { user: String },

    /// Retry badge deliveries that failed earlier
    RedeliverBadges,
}

#[derive(Subcommand)]
enum QuestAction {
    Start {
        user: String,
        quest: String,
    },
    Complete {
        user: String,
        quest: String,
        /// Evidence as JSON, checked against the quest requirements
        #[arg(short, long, default_value = "{}")]
        evidence: String,
    },
    Abandon {
        user: String,
        quest: String,
    },
}

#[derive(Subcommand)]
enum ChallengeAction {
    Join {
        user: String,
        challenge: String,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    Complete {
        user: String,
        challenge: String,
        #[arg(short, long, default_value = "{}")]
        evidence: String,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        // Callers branch on the error kind, so failures are JSON on stdout too
        cli::print_json(&cli::ErrorReport::from_error(&err))?;
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Init { force } = cli.command {
        return cli::init::init_command(cli.config, cli.db, force);
    }

    let engine = cli::open_engine(cli.config.as_deref(), cli.db.as_deref())?;
    let now = Utc::now();

    match cli.command {
        Commands::Init { .. } => {}
        Commands::ImportCatalog { file } => {
            cli::catalog::import_command(&engine, &file)?;
        }
        Commands::Award {
            user,
            amount,
            reason,
            key,
        } => {
            cli::xp::award_command(&engine, &user, amount, &reason, &key)?;
        }
        Commands::Login { user, at } => {
            cli::xp::login_command(&engine, &user, at.unwrap_or(now))?;
        }
        Commands::Activity { user, streak, at } => {
            cli::xp::activity_command(&engine, &user, &streak, at.unwrap_or(now))?;
        }
        Commands::Quest { action } => match action {
            QuestAction::Start { user, quest } => {
                cli::quest::start_command(&engine, &user, &quest)?;
            }
            QuestAction::Complete {
                user,
                quest,
                evidence,
            } => {
                cli::quest::complete_command(&engine, &user, &quest, &evidence).await?;
            }
            QuestAction::Abandon { user, quest } => {
                cli::quest::abandon_command(&engine, &user, &quest)?;
            }
        },
        Commands::Challenge { action } => match action {
            ChallengeAction::Join {
                user,
                challenge,
                at,
            } => {
                cli::quest::join_challenge_command(&engine, &user, &challenge, at.unwrap_or(now))?;
            }
            ChallengeAction::Complete {
                user,
                challenge,
                evidence,
                at,
            } => {
                cli::quest::complete_challenge_command(
                    &engine,
                    &user,
                    &challenge,
                    &evidence,
                    at.unwrap_or(now),
                )
                .await?;
            }
        },
        Commands::Purchase { user, item } => {
            cli::store::purchase_command(&engine, &user, &item)?;
        }
        Commands::Status { user } => {
            cli::status::status_command(&engine, &user)?;
        }
        Commands::Leaderboard { limit, users } => {
            cli::status::leaderboard_command(&engine, limit, users)?;
        }
        Commands::History { user } => {
            cli::status::history_command(&engine, &user)?;
        }
        Commands::RedeliverBadges => {
            let delivered = engine.redeliver_badges().await?;
            println!("Redelivered {} badge unlocks", delivered);
        }
    }

    Ok(())
}
