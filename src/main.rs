//! Binary entrypoint for the critterbot CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml` and the bundled species catalog
//! - `start` - run the bot with the console gateway
//! - `simulate [--players N] [--rounds N] [--seed N]` - push synthetic game events through
//! - `status` - print a short summary of the configured bot and its data
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use critterbot::bot::{start_dispatcher, BotServer, ConsoleNotifier};
use critterbot::config::Config;

/// Species catalog written by `init` when the data directory has none.
const BUNDLED_SPECIES: &str = include_str!("../data/species.json");

#[derive(Parser)]
#[command(name = "critterbot")]
#[command(about = "Seasonal events, quests and progression for a creature-collection chat game")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default configuration and species catalog
    Init,
    /// Start the bot, reading `<player_id> <message>` lines from stdin
    Start,
    /// Fire random catches, trades and market sales at the game services
    Simulate {
        #[arg(short, long, default_value_t = 4)]
        players: u32,
        #[arg(short, long, default_value_t = 20)]
        rounds: u32,
        #[arg(short, long, default_value_t = 7)]
        seed: u64,
    },
    /// Show bot status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(&None, cli.verbose);
            info!("Initializing new critterbot configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);

            let cfg = Config::default();
            tokio::fs::create_dir_all(&cfg.storage.data_dir).await?;
            let species = cfg.storage.species_path();
            if tokio::fs::metadata(&species).await.is_err() {
                tokio::fs::write(&species, BUNDLED_SPECIES).await?;
                info!("Wrote species catalog to {}", species.display());
            }
        }
        Commands::Start => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting critterbot v{}", env!("CARGO_PKG_VERSION"));
            let mut bot = BotServer::new(config).await?;
            bot.run().await?;
        }
        Commands::Simulate {
            players,
            rounds,
            seed,
        } => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let bot = BotServer::new(config).await?;
            let notifications = start_dispatcher(Arc::new(ConsoleNotifier));
            let report = bot.simulate(players, rounds, seed, &notifications).await?;
            notifications.shutdown().await;
            println!(
                "players={} events={} notices={} failures={}",
                report.players, report.events, report.notices, report.failures
            );
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let bot = BotServer::new(config).await?;
            bot.show_status().await?;
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    // CLI verbosity wins over the config file
    let level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(level);

    let file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
    match file {
        Some(f) => {
            let sink = std::sync::Mutex::new(f);
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let line = format!(
                    "{} [{}] {}",
                    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    record.level(),
                    record.args()
                );
                if let Ok(mut guard) = sink.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                // Console too when running in the foreground
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
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
    }
    let _ = builder.try_init();
}
