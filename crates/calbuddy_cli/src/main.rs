//! `calbuddy` command-line entry point.
//!
//! # Responsibility
//! - Resolve configuration, start logging and open the event store.
//! - Dispatch to sync (the default), view, changes or show-db.
//! - Exit non-zero on any failure.

mod output;

use anyhow::{bail, Context, Result};
use calbuddy_core::db::Connection;
use calbuddy_core::{
    init_logging, open_db, parse_date_arg, parse_since, BuddyConfig, FileSource,
    IcalBuddySource, ListingSource, LoggingError, LookbackWindow, QueryService,
    SqliteEventStore, SyncEngine,
};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use log::info;
use output::{print_rows, print_sync_summary, OutputFormat, StoredEventRow};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const SHOW_DB_CHANGE_LIMIT: u32 = 50;

#[derive(Debug, Parser)]
#[command(
    name = "calbuddy",
    version,
    about = "Sync macOS Calendar listings from icalBuddy into SQLite and print events or change history."
)]
struct Cli {
    /// Event store path.
    #[arg(long, global = true, env = "CALBUDDY_DB", value_name = "PATH")]
    db: Option<PathBuf>,

    /// trace|debug|info|warn|error
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(flatten)]
    sync: SyncArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Flags for the default fetch-and-sync run.
#[derive(Debug, Args)]
struct SyncArgs {
    /// Days to look back from today. Anything above 0 never removes events.
    #[arg(long, default_value_t = 0, value_name = "DAYS")]
    lookback: u32,

    /// Run the sync logic without writing events or changes.
    #[arg(long)]
    dry_run: bool,

    /// Read a captured listing instead of running icalBuddy.
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Keep a copy of the raw icalBuddy output.
    #[arg(long)]
    write_raw: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Active events for a date (default today) or a date range.
    View {
        /// YYYY-MM-DD
        #[arg(long, conflicts_with_all = ["from", "to"])]
        date: Option<String>,
        /// Inclusive range start, YYYY-MM-DD.
        #[arg(long)]
        from: Option<String>,
        /// Inclusive range end, YYYY-MM-DD.
        #[arg(long)]
        to: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Change history, oldest first.
    Changes {
        /// ISO timestamp or `<N>h`, e.g. 48h.
        #[arg(long)]
        since: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Debug dump of stored events and the latest changes.
    ShowDb,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    start_logging(&config)?;

    let mut conn = open_db(&config.store_path).with_context(|| {
        format!("failed to open event store `{}`", config.store_path.display())
    })?;

    match cli.command {
        None => run_sync(&mut conn, &config, &cli.sync),
        Some(Command::View {
            date,
            from,
            to,
            format,
        }) => run_view(&conn, date, from, to, format),
        Some(Command::Changes { since, format }) => run_changes(&conn, since, format),
        Some(Command::ShowDb) => run_show_db(&conn),
    }
}

fn resolve_config(cli: &Cli) -> Result<BuddyConfig> {
    let mut config = BuddyConfig::from_env().context("failed to resolve configuration")?;
    if let Some(db) = cli.db.as_deref() {
        config.store_path = absolutize(db)?;
    }
    if let Some(dir) = cli.log_dir.as_deref() {
        config.log_dir = absolutize(dir)?;
    }
    if let Some(level) = cli.log_level.as_deref() {
        config.log_level = level.to_string();
    }
    config.lookback_days = cli.sync.lookback;
    config.validate()?;
    Ok(config)
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    Ok(cwd.join(path))
}

/// Bad settings fail the run; an unwritable log directory only warns.
fn start_logging(config: &BuddyConfig) -> Result<()> {
    match init_logging(&config.log_level, &config.log_dir) {
        Ok(()) => Ok(()),
        Err(err @ (LoggingError::UnsupportedLevel(_) | LoggingError::RelativeDir(_))) => {
            bail!(err)
        }
        Err(err) => {
            eprintln!("warning: file logging disabled: {err}");
            Ok(())
        }
    }
}

fn run_sync(conn: &mut Connection, config: &BuddyConfig, args: &SyncArgs) -> Result<()> {
    let window = LookbackWindow::new(Local::now().date_naive(), config.lookback_days);
    let source: Box<dyn ListingSource> = match args.input.as_deref() {
        Some(path) => Box::new(FileSource::new(path)),
        None => {
            let mut source =
                IcalBuddySource::new(config.source.binary.clone(), config.source.timeout);
            if args.write_raw {
                source = source.with_raw_dump(config.source.raw_dump_path.clone());
            }
            Box::new(source)
        }
    };
    info!(
        "event=cli_command module=cli status=start command=sync source={} lookback_days={} dry_run={}",
        source.name(),
        window.days,
        args.dry_run
    );

    let report = SyncEngine::new(conn)
        .sync_from_source(&*source, &window, args.dry_run)
        .context("sync aborted; no changes were written")?;
    print_sync_summary(
        &report,
        config.lookback_days,
        &config.store_path.display().to_string(),
    );
    Ok(())
}

fn run_view(
    conn: &Connection,
    date: Option<String>,
    from: Option<String>,
    to: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    info!("event=cli_command module=cli status=start command=view");
    let service = QueryService::new(SqliteEventStore::new(conn));

    let rows = match (date, from, to) {
        (Some(date), _, _) => service.events_on_date(parse_date_arg(&date)?)?,
        (None, None, None) => service.events_on_date(Local::now().date_naive())?,
        (None, from, to) => {
            let from = from.as_deref().map(parse_date_arg).transpose()?;
            let to = to.as_deref().map(parse_date_arg).transpose()?;
            service.events_in_range(from, to)?
        }
    };
    print_rows(&rows, format)?;
    Ok(())
}

fn run_changes(conn: &Connection, since: Option<String>, format: OutputFormat) -> Result<()> {
    info!("event=cli_command module=cli status=start command=changes");
    let since = since
        .as_deref()
        .map(|value| parse_since(value, Local::now().naive_local()))
        .transpose()?;

    let service = QueryService::new(SqliteEventStore::new(conn));
    let changes = service.changes_since(since)?;
    print_rows(&changes, format)?;
    Ok(())
}

fn run_show_db(conn: &Connection) -> Result<()> {
    info!("event=cli_command module=cli status=start command=show_db");
    let service = QueryService::new(SqliteEventStore::new(conn));
    let events = service.all_events()?;
    let changes = service.recent_changes(SHOW_DB_CHANGE_LIMIT)?;

    println!("=== events ===");
    let rows: Vec<StoredEventRow<'_>> = events.iter().map(StoredEventRow).collect();
    print_rows(&rows, OutputFormat::Table)?;
    println!("\n=== changes (last {SHOW_DB_CHANGE_LIMIT}) ===");
    print_rows(&changes, OutputFormat::Table)?;
    Ok(())
}
