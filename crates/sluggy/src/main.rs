mod logging;

use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use sluggy_core::config::load_config;
use sluggy_core::db::{load_stored_stats, open_connection};
use sluggy_core::engine::{Collaborators, RegenerateOptions, SlugRegenerator};
use sluggy_core::migrate::{migrate_realurl_pathsegment, pending_migration_count, run_migrations};
use sluggy_core::pages::{SqlitePageStore, load_import_file};
use sluggy_core::redirects::SqliteRedirectStore;
use sluggy_core::report::{OutputFormat, ReportHeader, ReportWriter};
use sluggy_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, ensure_page_database,
    init_layout, inspect_runtime, normalize_for_display, resolve_paths,
};
use sluggy_core::sites::{ConfiguredSites, SiteError};
use sluggy_core::slugs::{SlugOptions, TitleSlugGenerator};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "sluggy",
    version,
    about = "Regenerate page slugs on a page tree, with diff reports and redirects"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            data_dir: cli.data_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init(InitArgs),
    Db(DbArgs),
    #[command(about = "Load page rows from a JSON array into the page database")]
    Import(ImportArgs),
    #[command(about = "Regenerate slugs for a page and all of its descendants")]
    Regenerate(RegenerateArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config.toml")]
    force: bool,
    #[arg(long, help = "Skip writing .sluggy/config.toml")]
    no_config: bool,
}

#[derive(Debug, Args)]
struct DbArgs {
    #[command(subcommand)]
    command: DbSubcommand,
}

#[derive(Debug, Subcommand)]
enum DbSubcommand {
    Stats,
    Migrate,
    #[command(
        name = "migrate-realurl",
        about = "Copy tx_realurl_pathsegment into tx_cronsluggy_pathsegment"
    )]
    MigrateRealurl,
}

#[derive(Debug, Args)]
struct ImportArgs {
    path: PathBuf,
}

#[derive(Debug, Args)]
struct RegenerateArgs {
    #[arg(allow_negative_numbers = true)]
    root_page: i64,
    #[arg(short = 'd', long, help = "Do not change anything")]
    dry_mode: bool,
    #[arg(
        short = 'f',
        long,
        default_value = "plain",
        help = "Output format (csv, html, plain)"
    )]
    format: OutputFormat,
    #[arg(
        short = 'r',
        long,
        value_name = "DAYS",
        num_args = 0..=1,
        help = "Create redirects for changed slugs with this TTL in days (config default without value)"
    )]
    redirects: Option<Option<u32>>,
    #[arg(short = 'v', long, help = "Also report unchanged pages")]
    verbose: bool,
    #[arg(long, help = "Add a colored DIFF line to plain output")]
    color: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    let Some(command) = cli.command else {
        let mut command = Cli::command();
        command.print_help()?;
        println!();
        return Ok(());
    };

    let paths = resolve_runtime_paths(&runtime)?;
    let _log_guard = logging::init_logger(&paths.logs_dir);

    match command {
        Commands::Init(args) => run_init(&runtime, &paths, args),
        Commands::Db(DbArgs { command }) => match command {
            DbSubcommand::Stats => run_db_stats(&runtime, &paths),
            DbSubcommand::Migrate => run_db_migrate(&runtime, &paths),
            DbSubcommand::MigrateRealurl => run_db_migrate_realurl(&runtime, &paths),
        },
        Commands::Import(args) => run_import(&runtime, &paths, args),
        Commands::Regenerate(args) => run_regenerate(&runtime, &paths, args),
    }
}

fn run_init(runtime: &RuntimeOptions, paths: &ResolvedPaths, args: InitArgs) -> Result<()> {
    let report = init_layout(
        paths,
        &InitOptions {
            materialize_config: !args.no_config,
            force: args.force,
        },
    )?;
    let migrations = run_migrations(paths)?;

    println!("Initialized sluggy runtime layout");
    println!("project_root: {}", normalize_for_display(&paths.project_root));
    println!("state_dir: {}", normalize_for_display(&paths.state_dir));
    println!("data_dir: {}", normalize_for_display(&paths.data_dir));
    println!("db_path: {}", normalize_for_display(&paths.db_path));
    println!("config_path: {}", normalize_for_display(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    println!("schema_version: {}", migrations.current_version);
    print_diagnostics(runtime, paths);
    Ok(())
}

fn run_db_migrate(runtime: &RuntimeOptions, paths: &ResolvedPaths) -> Result<()> {
    let report = run_migrations(paths)?;

    println!("db migrate");
    println!("db_path: {}", normalize_for_display(&paths.db_path));
    if report.applied.is_empty() {
        println!("applied: <none>");
    } else {
        for migration in &report.applied {
            println!("applied: v{:03}_{}", migration.version, migration.name);
        }
    }
    println!("schema_version: {}", report.current_version);
    print_diagnostics(runtime, paths);
    Ok(())
}

fn run_db_stats(runtime: &RuntimeOptions, paths: &ResolvedPaths) -> Result<()> {
    let status = inspect_runtime(paths)?;
    let stored = load_stored_stats(paths)?;

    println!("db stats");
    println!("db_path: {}", normalize_for_display(&paths.db_path));
    println!("db_exists: {}", format_flag(status.db_exists));
    println!(
        "db_size_bytes: {}",
        status
            .db_size_bytes
            .map(|size| size.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    match stored {
        Some(stored) => {
            println!("pages: {}", stored.pages);
            println!("pages.deleted: {}", stored.deleted_pages);
            println!("pages.translated: {}", stored.translated_pages);
            println!("redirects: {}", stored.redirects);
        }
        None => println!("pages: <no schema> (run `sluggy db migrate`)"),
    }
    println!("pending_migrations: {}", pending_migration_count(paths)?);
    print_warnings(&status.warnings);
    print_diagnostics(runtime, paths);
    Ok(())
}

fn run_db_migrate_realurl(runtime: &RuntimeOptions, paths: &ResolvedPaths) -> Result<()> {
    let status = inspect_runtime(paths)?;
    ensure_page_database(paths, &status)?;
    let connection = open_connection(&paths.db_path)?;
    let report = migrate_realurl_pathsegment(&connection)?;

    println!("db migrate-realurl");
    println!("necessary: {}", format_flag(report.necessary));
    println!("updated_rows: {}", report.updated_rows);
    print_diagnostics(runtime, paths);
    Ok(())
}

fn run_import(runtime: &RuntimeOptions, paths: &ResolvedPaths, args: ImportArgs) -> Result<()> {
    run_migrations(paths)?;
    let rows = load_import_file(&args.path)?;
    let pages = SqlitePageStore::open(paths)?;
    let imported = pages.import_rows(&rows)?;
    info!(imported, path = %args.path.display(), "imported page rows");

    println!("import");
    println!("source: {}", normalize_for_display(&args.path));
    println!("db_path: {}", normalize_for_display(&paths.db_path));
    println!("imported_rows: {imported}");
    print_diagnostics(runtime, paths);
    Ok(())
}

fn run_regenerate(
    runtime: &RuntimeOptions,
    paths: &ResolvedPaths,
    args: RegenerateArgs,
) -> Result<()> {
    let status = inspect_runtime(paths)?;
    ensure_page_database(paths, &status)?;
    for warning in &status.warnings {
        warn!("{warning}");
    }
    if pending_migration_count(paths)? > 0 {
        bail!("page database schema is out of date; run `sluggy db migrate`");
    }
    if runtime.diagnostics {
        eprintln!("[diagnostics]\n{}", paths.diagnostics());
    }

    let config = load_config(&paths.config_path)?;
    let redirect_ttl_days = match args.redirects {
        None => None,
        Some(None) => Some(config.redirects.default_ttl_days_owned()),
        Some(Some(days)) => Some(days),
    };
    if args.color {
        colored::control::set_override(true);
    }

    let pages = SqlitePageStore::open(paths)?;
    let sites = ConfiguredSites::new(&config.sites, &pages)?;
    let generator =
        TitleSlugGenerator::new(&pages, &sites, SlugOptions::from_section(&config.slug));
    let redirects = SqliteRedirectStore::new(pages.connection());
    let regenerator = SlugRegenerator::new(
        Collaborators {
            pages: &pages,
            slugs: &generator,
            sites: &sites,
            redirects: &redirects,
        },
        RegenerateOptions {
            dry_run: args.dry_mode,
            redirect_ttl_days,
            include_diff: args.format.needs_diff(args.color),
        },
    );

    let run = regenerator.start(args.root_page).map_err(|err| {
        if let Some(SiteError::NotFound(page_id)) = err.downcast_ref::<SiteError>().cloned() {
            let hint = format!(
                "add a [[sites]] entry whose root_page_id is {page_id} or one of its ancestors to {}",
                normalize_for_display(&paths.config_path)
            );
            err.context(hint)
        } else {
            err
        }
    })?;

    let mut report = ReportWriter::new(
        BufWriter::new(io::stdout().lock()),
        args.format,
        args.verbose,
        args.color,
    );
    report.begin(ReportHeader::new(run.site(), &config.slug))?;
    let summary = run.walk(args.root_page, |record| report.record(record))?;
    report.finish().context("failed to write report")?;

    info!(
        site = %summary.site.identifier,
        visited = summary.visited.len(),
        changed = summary.changed,
        redirects = summary.redirects_created,
        dry_run = summary.dry_run,
        "regenerate finished"
    );
    Ok(())
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        data_dir: runtime.data_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn print_warnings(warnings: &[String]) {
    if !warnings.is_empty() {
        println!("warnings:");
        for warning in warnings {
            println!("  - {warning}");
        }
    }
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
