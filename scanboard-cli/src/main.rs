use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use scanboard_core::dashboard::Dashboard;
use scanboard_core::history::HistoryStore;
use scanboard_core::session::{ScanSession, TicketStatus};
use scanboard_core::storage::FileStorage;
use scanboard_core::{Config, ProviderKind, ScanEngine, ScanSubject, Scanner};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

mod render;

const DEFAULT_CONFIG_PATH: &str = "scanboard.json";
/// Exit status when the scanned subject is flagged
const EXIT_INFECTED: u8 = 2;

#[derive(Parser)]
#[command(
    name = "scanboard",
    version,
    about = "Scan files and URLs for malware and review scan history"
)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true, env = "SCANBOARD_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Engine to scan with: virustotal, ml or both
    #[arg(long, global = true)]
    engine: Option<ScanEngine>,

    /// Reputation provider: simulated or virustotal
    #[arg(long, global = true)]
    provider: Option<ProviderKind>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a file on disk
    ScanFile { path: PathBuf },
    /// Scan a URL
    ScanUrl { url: String },
    /// Show recent scans, newest first
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show scan statistics
    Dashboard,
    /// Delete the scan history
    Clear,
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(&cli.config)?;
    config
        .apply_env()
        .context("Invalid environment configuration")?;
    if let Some(provider) = cli.provider {
        config.provider = provider;
    }
    if let Some(engine) = cli.engine {
        config.default_engine = engine;
    }
    log::debug!("Effective configuration: {:?}", config);
    Ok(config)
}

fn history_store(config: &Config) -> HistoryStore {
    HistoryStore::new(Arc::new(FileStorage::new(config.history_dir.clone())))
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    match &cli.command {
        Commands::ScanFile { path } => {
            let subject = ScanSubject::from_path(path, config.max_file_size)
                .with_context(|| format!("Cannot scan '{}'", path.display()))?;
            scan(&config, subject, cli.json)
        }
        Commands::ScanUrl { url } => scan(&config, ScanSubject::url(url.clone()), cli.json),
        Commands::History { limit } => {
            let records = history_store(&config).load();
            let recent = scanboard_core::dashboard::recent(&records, *limit);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&recent)?);
            } else {
                render::print_history(&recent);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Dashboard => {
            let records = history_store(&config).load();
            let dashboard = Dashboard::compute(&records, chrono::Utc::now());
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&dashboard)?);
            } else {
                render::print_dashboard(&dashboard, &records);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Clear => {
            history_store(&config)
                .clear()
                .context("Cannot clear scan history")?;
            if !cli.json {
                println!("Scan history cleared.");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", render::redacted_config_json(&config)?);
                Ok(ExitCode::SUCCESS)
            }
            ConfigAction::Init { force } => {
                init_config(&cli.config, *force)?;
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "'{}' already exists (use --force to overwrite)",
            path.display()
        );
    }
    // defaults only; credentials stay in the environment
    Config::default()
        .save(path)
        .with_context(|| format!("Cannot write '{}'", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn scan(config: &Config, subject: ScanSubject, json: bool) -> Result<ExitCode> {
    let scanner = Scanner::from_config(config).context("Cannot set up scanner")?;
    log::info!(
        "Using {} provider, engine '{}'",
        scanner.provider_name(),
        config.default_engine
    );
    let session = ScanSession::new(Arc::new(scanner));
    let ticket = session.start(subject, config.default_engine);

    let resolution = loop {
        match ticket.poll(Duration::from_millis(300)) {
            TicketStatus::Resolved(resolution) => break resolution,
            TicketStatus::Abandoned => bail!("Scan worker stopped without a result"),
            TicketStatus::Pending => {}
        }
        if !json {
            eprint!("\rScanning... {:>3}%", session.progress());
            let _ = std::io::stderr().flush();
        }
    };
    if !json {
        eprintln!("\rScanning... 100%");
    }

    let outcome = resolution.outcome.context("Scan failed")?;
    if let Some(e) = &outcome.persist_error {
        log::warn!("Scan result was not saved to history: {}", e);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.record)?);
    } else {
        render::print_outcome(&outcome);
    }

    if outcome.record.is_infected {
        Ok(ExitCode::from(EXIT_INFECTED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
