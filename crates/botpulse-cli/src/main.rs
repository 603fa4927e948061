//! botpulse CLI - conversation analytics for chatbot runtimes

use anyhow::{anyhow, Context, Result};
use botpulse_core::MetricsConfig;
use botpulse_metrics::{
    fixed_connector, spawn_dispatcher, write_url, HostEvent, MemorySink, MetricsRecorder,
    PointWriter, SubjectConfig,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "botpulse")]
#[command(about = "Turn chatbot runtime events into time-series metrics")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file
    #[arg(short, long, global = true, default_value = ".botpulse/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the resolved sink settings
    Check,

    /// Feed JSON-lines hook events through the recorder
    Replay {
        /// Event file (stdin when omitted)
        file: Option<PathBuf>,

        /// Print points as line protocol instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// Queued events and concurrent hook calls allowed
        #[arg(long, default_value = "64")]
        capacity: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so replay output stays clean
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { force } => cmd_init(&cli.config, force),
        Commands::Check => cmd_check(&cli.config),
        Commands::Replay {
            file,
            dry_run,
            capacity,
        } => cmd_replay(&cli.config, file, dry_run, capacity).await,
    }
}

fn load_config(path: &Path) -> Result<MetricsConfig> {
    MetricsConfig::load_or_default(path)
        .with_context(|| format!("Failed to load config from {:?}", path))
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("Config already exists at {:?} (use --force to overwrite)", path);
        return Ok(());
    }

    MetricsConfig::write_default(path)
        .with_context(|| format!("Failed to write config to {:?}", path))?;
    println!("Wrote default config to {:?}", path);
    Ok(())
}

fn cmd_check(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let settings = config.sink_settings();
    let url = write_url(&settings).context("Invalid sink endpoint")?;

    println!("Config:        {:?}", path);
    println!("Write URL:     {}", url);
    println!("Organization:  {}", settings.organization);
    println!("Bucket:        {}", settings.bucket);
    println!("Precision:     {}", settings.precision);
    println!("Timeout:       {}s", settings.timeout_secs);
    println!(
        "Credential:    {} (env {})",
        settings.credential, config.credential_env
    );

    if config.subjects.is_empty() {
        println!("Subjects:      (none, everything is '{}')", config.default_subject);
    } else {
        println!(
            "Subjects:      {} (default '{}', tag '{}')",
            config.subjects.join(", "),
            config.default_subject,
            config.subject_tag
        );
    }

    Ok(())
}

/// Parse one replay line; blank lines and `#` comments yield nothing
fn parse_event_line(line: &str) -> Result<Option<HostEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let event = HostEvent::from_json(line).context("Malformed hook event")?;
    Ok(Some(event))
}

async fn cmd_replay(
    config_path: &Path,
    file: Option<PathBuf>,
    dry_run: bool,
    capacity: usize,
) -> Result<()> {
    let config = load_config(config_path)?;
    let settings = config.sink_settings();
    let subjects = SubjectConfig::new(config.subject_rules(), config.subject_tag.clone());

    let memory = dry_run.then(|| Arc::new(MemorySink::new()));
    let writer = match &memory {
        Some(sink) => PointWriter::new(settings, fixed_connector(sink.clone())),
        None => PointWriter::http(settings),
    }
    .context("Failed to open metrics sink")?;

    let recorder = Arc::new(MetricsRecorder::new(writer, subjects));
    let (tx, handle) = spawn_dispatcher(recorder.clone(), capacity);

    let input: Box<dyn AsyncRead + Unpin + Send> = match &file {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {:?}", path))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    let mut lines = BufReader::new(input).lines();
    let mut line_no = 0;
    let mut rejected = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read events")? {
        line_no += 1;
        match parse_event_line(&line) {
            Ok(Some(event)) => tx
                .send(event)
                .await
                .map_err(|_| anyhow!("Dispatcher stopped before input ended"))?,
            Ok(None) => {}
            Err(e) => {
                warn!("Skipping line {}: {:#}", line_no, e);
                rejected += 1;
            }
        }
    }
    drop(tx);

    let summary = handle.await.context("Dispatcher task failed")?;
    info!(
        "Replayed {} events ({} applied, {} malformed lines skipped)",
        summary.handled, summary.applied, rejected
    );

    if let Some(sink) = memory {
        let precision = recorder.writer().settings().precision;
        for point in sink.drain().await {
            println!("{}", point.to_line_protocol(precision)?);
        }
    }

    Ok(())
}
