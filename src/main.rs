//! Command line entry point for courtside
//!
//! `check-config` validates a configuration and prints what it resolves to.
//! `simulate` drives a batch of matches through the full lifecycle against an
//! in-memory store and prints the resulting leaderboard.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use courtside::config::{validate_config, AppConfig};
use courtside::service::AppState;
use courtside::store::InMemoryMatchStore;
use courtside::types::{Court, NewMatch, Score, Sport, Team, UserId, UserProfile};
use courtside::utils::validate_participant_count;
use courtside::ScoreOutcome;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Courtside - match lifecycle and ELO rating engine
#[derive(Parser)]
#[command(
    name = "courtside",
    version,
    about = "Match lifecycle and ELO rating engine for pickup sports",
    long_about = "Courtside takes pickup matches from creation through team formation, play and \
                 a two-team score agreement, then applies team-average ELO rating changes to \
                 every participant."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        global = true,
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        global = true,
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, global = true, help = "Enable debug mode with verbose logging")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate configuration and print a summary
    CheckConfig,

    /// Play matches end to end against an in-memory store
    Simulate {
        /// Number of matches to play
        #[arg(short, long, default_value = "10")]
        matches: usize,

        /// Participants per match (even, at least 2)
        #[arg(short, long, default_value = "4")]
        participants: u32,

        /// Sport to play
        #[arg(short, long, default_value = "basketball")]
        sport: Sport,

        /// Print Prometheus metrics after the run
        #[arg(long)]
        print_metrics: bool,
    },
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Load configuration from file or environment, then apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    validate_config(&config)?;
    Ok(config)
}

fn print_config_summary(config: &AppConfig) {
    println!("Configuration OK");
    println!("  Service: {}", config.service.name);
    println!("  Log level: {}", config.service.log_level);
    println!(
        "  Max participants: {}",
        config.matches.max_participant_count
    );
    println!("  Notify on finish: {}", config.matches.notify_on_finish);
    println!(
        "  Rating: K={} initial={}",
        config.rating.k_factor, config.rating.initial_rating
    );
    println!("  Store: {:?}", config.store.backend);
    if config.amqp.enabled {
        println!(
            "  AMQP: {}:{}{} exchange={}",
            config.amqp.host, config.amqp.port, config.amqp.vhost, config.amqp.exchange
        );
    } else {
        println!("  AMQP: disabled");
    }
}

/// Deterministic score for the nth simulated match
fn simulated_score(round: usize) -> Score {
    let score1 = ((round * 7 + 3) % 11) as i32;
    let score2 = ((round * 5 + 1) % 11) as i32;
    Score::new(score1, score2)
}

async fn simulate(
    config: AppConfig,
    matches: usize,
    participants: u32,
    sport: Sport,
    print_metrics: bool,
) -> Result<()> {
    validate_participant_count(participants, config.matches.max_participant_count)?;

    let store = InMemoryMatchStore::new();
    let court_id = Uuid::new_v4();
    store
        .add_court(Court {
            id: court_id,
            name: "Simulation Court".to_string(),
        })
        .await;

    // Twice the seats so rosters rotate between rounds
    let pool_size = participants as usize * 2;
    let mut pool: Vec<UserId> = Vec::with_capacity(pool_size);
    for n in 1..=pool_size {
        let id = Uuid::new_v4();
        store
            .add_user(UserProfile {
                id,
                name: format!("player-{:02}", n),
                contact: format!("player-{:02}@courtside.local", n),
            })
            .await;
        pool.push(id);
    }

    let app = AppState::with_store(config, Arc::new(store))
        .await
        .context("Failed to initialize courtside")?;
    let manager = app.manager();

    let per_team = participants as usize / 2;
    for round in 0..matches {
        let roster: Vec<UserId> = (0..participants as usize)
            .map(|i| pool[(round + i) % pool_size])
            .collect();
        let (team1, team2) = roster.split_at(per_team);

        let record = manager
            .create(
                team1[0],
                NewMatch {
                    sport,
                    court_id,
                    participant_count: participants,
                    scheduled_at: None,
                },
            )
            .await?;
        for &user in &team1[1..] {
            manager.join(record.id, user, Team::One).await?;
        }
        for &user in team2 {
            manager.join(record.id, user, Team::Two).await?;
        }

        manager.start(record.id, team1[0]).await?;
        manager.finish(record.id, team1[0]).await?;

        let score = simulated_score(round);
        manager.submit_score(record.id, team1[0], score).await?;
        match manager.submit_score(record.id, team2[0], score).await? {
            ScoreOutcome::Finalized {
                notification_failures,
                ..
            } => {
                info!(round, match_id = %record.id, score = %score, "Simulated match finished");
                if !notification_failures.is_empty() {
                    warn!(
                        round,
                        failures = notification_failures.len(),
                        "Some result notifications failed"
                    );
                }
            }
            ScoreOutcome::Pending { .. } => {
                anyhow::bail!("match {} did not reach consensus", record.id);
            }
        }
    }

    let leaderboard = manager.leaderboard(court_id, sport, pool_size).await?;
    println!("Leaderboard for {} after {} matches", sport, matches);
    for (rank, entry) in leaderboard.iter().enumerate() {
        let name = pool
            .iter()
            .position(|id| *id == entry.user_id)
            .map(|n| format!("player-{:02}", n + 1))
            .unwrap_or_else(|| entry.user_id.to_string());
        println!("  {:>2}. {:<10} {}", rank + 1, name, entry.elo);
    }

    if print_metrics {
        println!();
        print!("{}", app.metrics().render()?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    match args.command {
        Command::CheckConfig => {
            print_config_summary(&config);
            Ok(())
        }
        Command::Simulate {
            matches,
            participants,
            sport,
            print_metrics,
        } => simulate(config, matches, participants, sport, print_metrics).await,
    }
}
