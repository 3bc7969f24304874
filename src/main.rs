use clap::{Parser, Subcommand};
use seshdex::formatting::{self, OutputMode};
use seshdex::{config, dates, indexer, search, shutdown, stats, storage};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "seshdex", version, about = "Search and explore local Claude session logs")]
struct Cli {
    /// Override the configured database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Override the configured sessions root directory
    #[arg(long, global = true)]
    sessions_root: Option<PathBuf>,

    /// Path to config file (default: ~/.seshdex/seshdex.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the sessions root and (re-)index changed sessions
    Sync {
        /// Re-extract every discovered session, ignoring extraction state
        #[arg(long)]
        force: bool,

        /// Only sync sessions whose project path contains this substring
        #[arg(long)]
        project: Option<String>,

        /// Only sync the session with this exact id
        #[arg(long)]
        session: Option<String>,

        #[arg(long, conflicts_with = "verbose")]
        quiet: bool,

        #[arg(long, conflicts_with = "quiet")]
        verbose: bool,
    },

    /// Full-text search across indexed messages
    Search {
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: i64,

        #[arg(long)]
        project: Option<String>,

        #[arg(long)]
        session: Option<String>,

        /// user, assistant, all, or a comma list
        #[arg(long)]
        role: Option<String>,

        #[arg(long, conflicts_with_all = ["before", "days"])]
        since: Option<String>,

        #[arg(long, conflicts_with_all = ["since", "days"])]
        before: Option<String>,

        #[arg(long, conflicts_with_all = ["since", "before"])]
        days: Option<i64>,

        #[arg(long)]
        json: bool,

        #[arg(long, conflicts_with = "verbose")]
        quiet: bool,

        #[arg(long, conflicts_with = "quiet")]
        verbose: bool,
    },

    /// List indexed sessions, most recent first
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,

        #[arg(long)]
        project: Option<String>,

        #[arg(long, conflicts_with_all = ["before", "days"])]
        since: Option<String>,

        #[arg(long, conflicts_with_all = ["since", "days"])]
        before: Option<String>,

        #[arg(long, conflicts_with_all = ["since", "before"])]
        days: Option<i64>,

        #[arg(long)]
        json: bool,

        #[arg(long, conflicts_with = "verbose")]
        quiet: bool,

        #[arg(long, conflicts_with = "quiet")]
        verbose: bool,
    },

    /// Show aggregate usage statistics
    Stats {
        #[arg(long, default_value_t = 10)]
        projects: u32,

        #[arg(long)]
        json: bool,

        #[arg(long, conflicts_with = "verbose")]
        quiet: bool,

        #[arg(long, conflicts_with = "quiet")]
        verbose: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let cfg = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e:#}");
            std::process::exit(1);
        }
    };

    let log_level = cfg.resolved_log_level().to_string();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    install_interrupt_handler();

    let db_path = cli.db.clone().unwrap_or_else(|| cfg.resolved_db_path());
    let sessions_root = cli.sessions_root.clone().unwrap_or_else(|| cfg.resolved_sessions_root());

    let exit_code = match cli.command {
        Commands::Sync { force, project, session, quiet, verbose } => {
            run_sync(&db_path, &sessions_root, force, project, session, quiet, verbose)
        }
        Commands::Search { query, limit, project, session, role, since, before, days, json, quiet, verbose } => {
            run_search(&db_path, query, limit, project, session, role, since, before, days, json, quiet, verbose)
        }
        Commands::List { limit, project, since, before, days, json, quiet, verbose } => {
            run_list(&db_path, limit, project, since, before, days, json, quiet, verbose)
        }
        Commands::Stats { projects, json, quiet, verbose } => run_stats(&db_path, projects, json, quiet, verbose),
    };

    std::process::exit(exit_code);
}

/// Registers the Ctrl-C handler that routes into the shared shutdown
/// module, so a long `sync` can be interrupted the same way regardless of
/// which command is running.
fn install_interrupt_handler() {
    let _ = ctrlc::set_handler(|| {
        shutdown::handle_interrupt(&shutdown::RealEnv);
    });
}

#[allow(clippy::too_many_arguments)]
fn run_sync(
    db_path: &PathBuf,
    sessions_root: &PathBuf,
    force: bool,
    project: Option<String>,
    session: Option<String>,
    quiet: bool,
    verbose: bool,
) -> i32 {
    let conn = match seshdex::db::open(db_path) {
        Ok(c) => c,
        Err(e) => return report_error(e),
    };

    let mode = OutputMode::from_flags(false, quiet, verbose);
    let opts = indexer::SyncOptions {
        force,
        project_filter: project,
        session_filter: session,
        quiet,
        verbose,
        checkpoint_enabled: true,
        checkpoint_path: None,
    };

    let mut callbacks = indexer::SyncCallbacks::default();
    if verbose {
        callbacks.on_session_complete = Some(Box::new(|id, outcome| match outcome {
            Ok(n) => println!("  {id}: {n} messages"),
            Err(e) => println!("  {id}: error: {e}"),
        }));
    }

    match indexer::run_sync(&conn, sessions_root, &opts, &mut callbacks) {
        Ok(result) => {
            let _ = seshdex::db::checkpoint_truncate(&conn);
            print_sync_result(&result, mode);
            if result.success { 0 } else { 1 }
        }
        Err(e) => report_error(e),
    }
}

fn print_sync_result(result: &indexer::SyncResult, mode: OutputMode) {
    match mode {
        OutputMode::Json => println!("{}", sync_result_json(result)),
        OutputMode::Quiet => {
            println!("Processed: {}\nSkipped: {}\nErrors: {}", result.sessions_processed, result.sessions_skipped, result.errors.len());
        }
        _ => {
            println!(
                "Discovered {} session(s): {} processed, {} skipped, {} error(s) in {}ms",
                result.sessions_discovered, result.sessions_processed, result.sessions_skipped,
                result.errors.len(), result.duration_ms
            );
            if result.aborted {
                println!("Interrupted before completion.");
            }
            for (id, message) in &result.errors {
                println!("  {id}: {message}");
            }
        }
    }
}

fn sync_result_json(result: &indexer::SyncResult) -> String {
    serde_json::json!({
        "success": result.success,
        "sessions_discovered": result.sessions_discovered,
        "sessions_processed": result.sessions_processed,
        "sessions_skipped": result.sessions_skipped,
        "messages_inserted": result.messages_inserted,
        "errors": result.errors,
        "duration_ms": result.duration_ms,
        "aborted": result.aborted,
        "recovered_from_checkpoint": result.recovered_from_checkpoint,
    })
    .to_string()
}

#[allow(clippy::too_many_arguments)]
fn run_search(
    db_path: &PathBuf,
    query: String,
    limit: i64,
    project: Option<String>,
    session: Option<String>,
    role: Option<String>,
    since: Option<String>,
    before: Option<String>,
    days: Option<i64>,
    json: bool,
    quiet: bool,
    verbose: bool,
) -> i32 {
    let conn = match seshdex::db::open(db_path) {
        Ok(c) => c,
        Err(e) => return report_error(e),
    };

    let (since_resolved, before_resolved) = match resolve_date_window(since, before, days) {
        Ok(pair) => pair,
        Err(e) => return report_error(e),
    };

    let role_filter = match role {
        Some(r) if r == "all" => Vec::new(),
        Some(r) => r.split(',').map(|s| s.trim().to_string()).collect(),
        None => Vec::new(),
    };

    let opts = search::SearchOptions {
        project_filter: project,
        role_filter,
        session_filter: session,
        since_date: since_resolved,
        before_date: before_resolved,
        limit: Some(limit),
        snippet_tokens: None,
    };

    match search::search(&conn, &query, &opts) {
        Ok(results) => {
            let mode = OutputMode::from_flags(json, quiet, verbose);
            print!("{}", formatting::render_search_results(&results, mode));
            0
        }
        Err(e) => report_error(e),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_list(
    db_path: &PathBuf,
    limit: i64,
    project: Option<String>,
    since: Option<String>,
    before: Option<String>,
    days: Option<i64>,
    json: bool,
    quiet: bool,
    verbose: bool,
) -> i32 {
    let conn = match seshdex::db::open(db_path) {
        Ok(c) => c,
        Err(e) => return report_error(e),
    };

    let (since_resolved, before_resolved) = match resolve_date_window(since, before, days) {
        Ok(pair) => pair,
        Err(e) => return report_error(e),
    };

    let filter = storage::SessionFilter {
        project_filter: project,
        since_date: since_resolved,
        before_date: before_resolved,
        limit: Some(limit),
    };

    match storage::find_filtered(&conn, &filter) {
        Ok(sessions) => {
            let mode = OutputMode::from_flags(json, quiet, verbose);
            print!("{}", formatting::render_session_list(&sessions, mode));
            0
        }
        Err(e) => report_error(e),
    }
}

fn run_stats(db_path: &PathBuf, projects: u32, json: bool, quiet: bool, verbose: bool) -> i32 {
    let conn = match seshdex::db::open(db_path) {
        Ok(c) => c,
        Err(e) => return report_error(e),
    };

    match stats::compute_stats(&conn, projects) {
        Ok(s) => {
            let mode = OutputMode::from_flags(json, quiet, verbose);
            print!("{}", formatting::render_stats(&s, mode));
            0
        }
        Err(e) => report_error(e),
    }
}

/// `--days N` is exclusive of `--since`/`--before` (enforced by clap), so at
/// most one branch here ever fires.
fn resolve_date_window(
    since: Option<String>,
    before: Option<String>,
    days: Option<i64>,
) -> anyhow::Result<(Option<String>, Option<String>)> {
    if let Some(n) = days {
        return Ok((Some(dates::days_to_since(n)), None));
    }
    let since = since.map(|s| dates::parse_date_expr(&s)).transpose()?;
    let before = before.map(|s| dates::parse_date_expr(&s)).transpose()?;
    Ok((since, before))
}

fn report_error(e: anyhow::Error) -> i32 {
    eprintln!("error: {e:#}");
    if let Some(seshdex_err) = e.downcast_ref::<seshdex::error::SeshdexError>() {
        return seshdex_err.exit_code();
    }
    1
}
