//! Binary entrypoint for the hunterlog CLI.
//!
//! Commands:
//! - `init` - write a starter `hunterlog.toml`
//! - `status` - print the player state summary
//! - `rollover` / `sync` - run the daily rollover or the discipline refresh
//! - `xp`, `gold`, `habit`, `quest`, `redeem`, `focus`, `focus-quest` - player actions
//! - `report` - today snapshot, weekly performance and achievements
//! - `export <path>` / `import <path>` - whole-profile snapshots
//! - `run` - keep the background jobs running until Ctrl-C
//!
//! See the library crate docs for module-level details: `hunterlog::`.
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde::Serialize;

use hunterlog::config::Config;
use hunterlog::engine::achievement::{achievement_list, latest_unlock};
use hunterlog::engine::leveling::{level_progress_percent, xp_for_next_level};
use hunterlog::engine::scheduler::start_scheduler;
use hunterlog::engine::{DateKey, Difficulty, Game, GameAction, PenaltySource, SystemClock};
use hunterlog::storage::{export_snapshot, import_snapshot};

#[derive(Parser)]
#[command(name = "hunterlog")]
#[command(about = "Gamified habit and quest tracker with XP, ranks and a daily rollover")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "hunterlog.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Show level, rank, gold and discipline
    Status,
    /// Run the daily rollover now (no-op if it already ran today)
    Rollover,
    /// Refresh discipline metrics, today's grade and achievements
    Sync,
    /// Grant or remove XP
    Xp {
        #[command(subcommand)]
        action: XpCommand,
    },
    /// Earn or spend gold
    Gold {
        #[command(subcommand)]
        action: GoldCommand,
    },
    /// Manage habits
    Habit {
        #[command(subcommand)]
        action: HabitCommand,
    },
    /// Manage quests
    Quest {
        #[command(subcommand)]
        action: QuestCommand,
    },
    /// Spend gold on a reward
    Redeem { title: String, cost: u64 },
    /// Record a finished focus-timer session
    Focus { xp: u64 },
    /// Set the focus quest, or clear it when no id is given
    FocusQuest { id: Option<String> },
    /// Today snapshot, weekly performance and achievements
    Report,
    /// Export every stored key to a JSON file
    Export { path: String },
    /// Import a JSON snapshot written by `export`
    Import { path: String },
    /// Run the background jobs until interrupted
    Run,
}

#[derive(Subcommand)]
enum XpCommand {
    Add {
        amount: f64,
    },
    Remove {
        amount: f64,
        #[arg(long, value_enum, default_value_t = SourceArg::Manual)]
        source: SourceArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Habit,
    Quest,
    Manual,
}

impl From<SourceArg> for PenaltySource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Habit => PenaltySource::Habit,
            SourceArg::Quest => PenaltySource::Quest,
            SourceArg::Manual => PenaltySource::Manual,
        }
    }
}

#[derive(Subcommand)]
enum GoldCommand {
    Earn { amount: f64 },
    Spend { amount: f64 },
}

#[derive(Subcommand)]
enum HabitCommand {
    Add {
        title: String,
        /// XP per completion (0 uses the default reward)
        #[arg(long, default_value_t = 0)]
        xp: u64,
    },
    Done {
        id: String,
    },
}

#[derive(Subcommand)]
enum QuestCommand {
    Add {
        title: String,
        #[arg(long, default_value = "normal")]
        difficulty: Difficulty,
        #[arg(long, default_value_t = 50)]
        xp: u64,
        #[arg(long, default_value_t = 10)]
        gold: u64,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        deadline: Option<DateKey>,
    },
    Done {
        id: String,
    },
    Fail {
        id: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_game(config: &Config) -> Result<Game> {
    let storage = config.open_storage()?;
    info!("Using {} storage at {}", storage.backend_name(), config.storage.path);
    Ok(Game::load(storage, Arc::new(SystemClock)).with_history_window(config.history.window_days()))
}

fn action_for(command: Commands) -> Option<GameAction> {
    let action = match command {
        Commands::Rollover => GameAction::Rollover,
        Commands::Sync => GameAction::SyncDiscipline,
        Commands::Xp { action } => match action {
            XpCommand::Add { amount } => GameAction::AddXp { amount },
            XpCommand::Remove { amount, source } => GameAction::RemoveXp {
                amount,
                source: source.into(),
            },
        },
        Commands::Gold { action } => match action {
            GoldCommand::Earn { amount } => GameAction::EarnGold { amount },
            GoldCommand::Spend { amount } => GameAction::SpendGold { amount },
        },
        Commands::Habit { action } => match action {
            HabitCommand::Add { title, xp } => GameAction::AddHabit { title, xp_reward: xp },
            HabitCommand::Done { id } => GameAction::CompleteHabit { id },
        },
        Commands::Quest { action } => match action {
            QuestCommand::Add {
                title,
                difficulty,
                xp,
                gold,
                deadline,
            } => GameAction::AddQuest {
                title,
                difficulty,
                xp,
                gold,
                deadline,
            },
            QuestCommand::Done { id } => GameAction::CompleteQuest { id },
            QuestCommand::Fail { id } => GameAction::FailQuest { id },
        },
        Commands::Redeem { title, cost } => GameAction::RedeemReward { title, cost },
        Commands::Focus { xp } => GameAction::FocusSession { xp },
        Commands::FocusQuest { id } => GameAction::SetFocus { id },
        _ => return None,
    };
    Some(action)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        init_logging(&None, cli.verbose);
        info!("Initializing new hunterlog configuration");
        Config::create_default(&cli.config).await?;
        info!("Configuration file created at {}", cli.config);
        return Ok(());
    }

    let config = Config::load_or_default(&cli.config).await?;
    init_logging(&Some(config.clone()), cli.verbose);

    match cli.command {
        Commands::Init => {}
        Commands::Status => {
            let mut game = open_game(&config)?;
            game.run_rollover();
            let sync = game.sync_discipline();
            let state = game.state();
            print_json(&serde_json::json!({
                "name": state.profile.player_name,
                "title": state.profile.title,
                "level": state.level,
                "rank": state.rank,
                "xp": state.xp,
                "xpToNextLevel": xp_for_next_level(state.level),
                "levelProgress": level_progress_percent(state.xp, state.level),
                "gold": state.gold,
                "streak": state.streak,
                "discipline": sync.metrics,
                "focusQuest": game.focus_quest(),
                "lastAction": game.last_action(),
                "lastRollover": game.last_rollover(),
            }))?;
        }
        Commands::Report => {
            let mut game = open_game(&config)?;
            game.run_rollover();
            game.discipline_tick();
            let today = game.today_snapshot();
            let week = game.weekly_performance();
            let unlocked = game.achievements();
            print_json(&serde_json::json!({
                "today": today,
                "week": week,
                "achievements": achievement_list(&unlocked),
                "latestUnlock": latest_unlock(&unlocked),
            }))?;
        }
        Commands::Export { path } => {
            let game = open_game(&config)?;
            let doc = export_snapshot(game.storage(), game.now());
            let content = serde_json::to_string_pretty(&doc)?;
            tokio::fs::write(&path, content)
                .await
                .with_context(|| format!("Failed to write snapshot {}", path))?;
            info!("Snapshot written to {}", path);
        }
        Commands::Import { path } => {
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read snapshot {}", path))?;
            let doc: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("Snapshot {} is not JSON", path))?;
            let storage = config.open_storage()?;
            let written =
                import_snapshot(&storage, &doc).map_err(|e| anyhow!("Import failed: {}", e))?;
            info!("Imported {} sections from {}", written, path);
            // normalize and persist what was imported
            let mut game = Game::load(storage, Arc::new(SystemClock))
                .with_history_window(config.history.window_days());
            game.sync_discipline();
        }
        Commands::Run => {
            let game = open_game(&config)?;
            info!("Starting hunterlog v{}", env!("CARGO_PKG_VERSION"));
            let handle = start_scheduler(game, config.scheduler.intervals());
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutting down");
            handle.shutdown().await;
        }
        command => {
            let Some(action) = action_for(command) else {
                return Ok(());
            };
            let mut game = open_game(&config)?;
            if !matches!(action, GameAction::Rollover) {
                game.run_rollover();
            }
            let outcome = game.dispatch(action);
            if let hunterlog::engine::ActionOutcome::Ignored(reason) = &outcome {
                warn!("Nothing changed: {}", reason);
            }
            print_json(&outcome)?;
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let configured = config
        .as_ref()
        .and_then(|cfg| cfg.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the console only when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stdout);

        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());

            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }

            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
