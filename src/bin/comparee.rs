#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comparee::store::{Leaderboard, RosterSource, SqliteStore};
use comparee::{
    CompareSession, ComparisonPair, ComparisonRecorder, JsonlTraceSink, Outcome, ParticipantId,
    Presentation, Round, SessionConfig, SessionDeps, SessionError,
};

#[derive(Parser)]
#[command(name = "comparee", version, about = "Comparee pairing CLI")]
struct Cli {
    /// SQLite store path (default: $COMPAREE_STORE_PATH or .comparee.sqlite)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a participant to the roster, or update their photo URL
    Register {
        #[arg(long)]
        id: String,
        #[arg(long)]
        asset_url: String,
    },
    /// Print the roster, one id per line
    Roster,
    /// Select the next unseen pair for a user and print it as JSON
    Next {
        #[arg(long)]
        user: String,
        /// Session config JSON
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write selection trace events as JSONL
        #[arg(long)]
        trace: Option<PathBuf>,
    },
    /// Record that a user has compared two participants
    Record {
        #[arg(long)]
        user: String,
        #[arg(long)]
        a: String,
        #[arg(long)]
        b: String,
        /// Winner of the round (must be --a or --b)
        #[arg(long)]
        winner: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print standings, highest win count first
    Leaderboard {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Export comparison records to JSONL
    Export {
        #[arg(long)]
        out: PathBuf,
    },
    /// Remove a participant and every record they own
    DeleteAccount {
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "comparee=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let path = cli.db.unwrap_or_else(SqliteStore::default_path);
    let store = Arc::new(SqliteStore::new(path)?);

    match cli.command {
        Commands::Register { id, asset_url } => {
            store
                .register_participant(&ParticipantId::new(id), &asset_url)
                .await?;
        }
        Commands::Roster => {
            let roster = store.fetch_roster().await?;
            for id in roster.ids() {
                println!("{id}");
            }
        }
        Commands::Next {
            user,
            config,
            trace,
        } => {
            let config = load_config(config)?;
            let deps = SessionDeps::from_store(store);
            let mut session = CompareSession::new(ParticipantId::new(user), deps, config);
            let writer = match trace {
                Some(path) => {
                    let (sink, writer) = JsonlTraceSink::create(path)?;
                    session = session.with_trace(Arc::new(sink));
                    Some(writer)
                }
                None => None,
            };

            let roster = session.start().await?;
            let result = session.next_round(&roster, None).await;
            // Drops the sink so the writer can drain and exit.
            drop(session);
            if let Some(writer) = writer {
                writer.finish()?;
            }
            print_round(result)?;
        }
        Commands::Record {
            user,
            a,
            b,
            winner,
            config,
        } => {
            let config = load_config(config)?;
            let pair = ComparisonPair::new(ParticipantId::new(a), ParticipantId::new(b))
                .ok_or("--a and --b must be different participants")?;
            let user = ParticipantId::new(user);
            if pair.contains(&user) {
                return Err("a user cannot record a pair that contains themselves".into());
            }
            let recorder = ComparisonRecorder::new(store.clone(), config.key_scheme)
                .with_leaderboard(store.clone());
            match winner.map(ParticipantId::new) {
                Some(winner) => {
                    let outcome = Outcome::from_pair(&pair, &winner)
                        .ok_or("--winner must be either --a or --b")?;
                    recorder.record_outcome(&user, &outcome).await?;
                    println!("{}", serde_json::to_string(&outcome)?);
                }
                None => recorder.record(&user, &pair).await?,
            }
        }
        Commands::Leaderboard { limit } => {
            for row in store.standings(limit).await? {
                println!("{}\t{}", row.participant, row.wins);
            }
        }
        Commands::Export { out } => {
            let written = store.export_jsonl(out).await?;
            println!("exported {written} records");
        }
        Commands::DeleteAccount { user } => {
            let _lock = store.lock_exclusive()?;
            let stats = store.delete_participant(&ParticipantId::new(user)).await?;
            if !stats.participant_deleted {
                return Err("no such participant".into());
            }
            println!("deleted participant and {} records", stats.records_deleted);
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<SessionConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(SessionConfig::from_path(path)?),
        None => Ok(SessionConfig::default()),
    }
}

/// Empty states are normal output; anything retryable is an error exit.
fn print_round(result: Result<Round, SessionError>) -> Result<(), Box<dyn std::error::Error>> {
    match result {
        Ok(round) => {
            println!("{}", serde_json::to_string(&round)?);
            Ok(())
        }
        Err(SessionError::Selection(e)) if e.presentation() == Presentation::EmptyState => {
            let status = serde_json::json!({
                "status": e.kind(),
                "message": e.to_string(),
            });
            println!("{status}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
