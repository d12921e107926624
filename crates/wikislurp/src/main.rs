use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wikislurp_core::cache::PageCache;
use wikislurp_core::config::{SlurpConfig, load_config};
use wikislurp_core::forge::{ForgeClient, ForgeClientConfig, ForgeEndpoints, ForgeSource};
use wikislurp_core::replay::{ReplayReport, replay_pages};
use wikislurp_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, init_layout, inspect_layout,
    normalize_for_display, resolve_paths,
};
use wikislurp_core::slurp::{SlurpReport, Slurper};
use wikislurp_core::store::RevisionStore;
use wikislurp_core::vcs::GitCli;

#[derive(Debug, Parser)]
#[command(
    name = "wikislurp",
    version,
    about = "Mirror a forge-hosted wiki and its edit history into a git repository"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    work_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    work_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            work_dir: cli.work_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Fetch every page's history and revisions, then replay them into git")]
    Run(ProjectArgs),
    #[command(about = "Fetch and store histories and revision text without touching git")]
    Fetch(ProjectArgs),
    #[command(about = "Replay stored histories into the git repository")]
    Replay,
    #[command(about = "List the wiki's pages")]
    Pages(ProjectArgs),
    #[command(about = "Show the work directory layout and cache counts")]
    Status,
}

#[derive(Debug, Args)]
struct ProjectArgs {
    #[arg(help = "Forge project identifier")]
    project: String,
}

struct Session {
    paths: ResolvedPaths,
    config: SlurpConfig,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Run(args)) => run_all(&runtime, &args.project),
        Some(Commands::Fetch(args)) => run_fetch(&runtime, &args.project),
        Some(Commands::Replay) => run_replay(&runtime),
        Some(Commands::Pages(args)) => run_pages(&runtime, &args.project),
        Some(Commands::Status) => run_status(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wikislurp=info,wikislurp_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_all(runtime: &RuntimeOptions, project: &str) -> Result<()> {
    let session = open_session(runtime)?;
    let (pages, slurp_report) = fetch_all(&session, project)?;
    let replay_report = replay_all(&session, &pages)?;

    println!("run");
    println!("project: {project}");
    print_slurp_report(&slurp_report);
    print_replay_report(&replay_report);
    println!("git_dir: {}", normalize_for_display(&session.paths.git_dir));
    print_diagnostics(runtime, &session.paths);
    Ok(())
}

fn run_fetch(runtime: &RuntimeOptions, project: &str) -> Result<()> {
    let session = open_session(runtime)?;
    let (_, report) = fetch_all(&session, project)?;

    println!("fetch");
    println!("project: {project}");
    print_slurp_report(&report);
    print_diagnostics(runtime, &session.paths);
    Ok(())
}

fn run_replay(runtime: &RuntimeOptions) -> Result<()> {
    let session = open_session(runtime)?;
    let store = RevisionStore::from_paths(&session.paths);
    let pages = store.list_pages()?;
    let report = replay_all(&session, &pages)?;

    println!("replay");
    print_replay_report(&report);
    println!("git_dir: {}", normalize_for_display(&session.paths.git_dir));
    print_diagnostics(runtime, &session.paths);
    Ok(())
}

fn run_pages(runtime: &RuntimeOptions, project: &str) -> Result<()> {
    let session = open_session(runtime)?;
    let mut slurper = slurper(&session, project)?;
    let pages = slurper.page_list()?;

    println!("pages");
    println!("project: {project}");
    println!("pages.count: {}", pages.len());
    if pages.is_empty() {
        println!("pages: <none>");
    } else {
        for page in &pages {
            println!("pages.name: {page}");
        }
    }
    println!("requests: {}", slurper.source().request_count());
    print_diagnostics(runtime, &session.paths);
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_layout(&paths)?;

    println!("status");
    println!("work_dir: {}", normalize_for_display(&paths.work_dir));
    println!("work_dir_exists: {}", format_flag(paths.work_dir.exists()));
    println!("config_exists: {}", format_flag(paths.config_path.exists()));
    println!("cache.html_files: {}", status.html_files);
    println!("store.history_files: {}", status.history_files);
    println!("store.md_files: {}", status.md_files);
    println!(
        "repository_initialized: {}",
        format_flag(status.repository_initialized)
    );
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn fetch_all(session: &Session, project: &str) -> Result<(Vec<String>, SlurpReport)> {
    let mut slurper = slurper(session, project)?;
    slurper.all_page_versions()
}

fn replay_all(session: &Session, pages: &[String]) -> Result<ReplayReport> {
    let store = RevisionStore::from_paths(&session.paths);
    let mut engine = GitCli::new(&session.paths.git_dir).with_committer(session.config.committer());
    replay_pages(&mut engine, &store, pages, &session.config.author_domain())
}

fn slurper(session: &Session, project: &str) -> Result<Slurper<ForgeClient>> {
    let endpoints = ForgeEndpoints::for_project(&session.config, project)?;
    let client = ForgeClient::new(ForgeClientConfig::from_config(&session.config))?;
    Ok(Slurper::new(
        client,
        endpoints,
        PageCache::new(&session.paths.html_dir),
        RevisionStore::from_paths(&session.paths),
    ))
}

fn open_session(runtime: &RuntimeOptions) -> Result<Session> {
    let paths = resolve_runtime_paths(runtime)?;
    init_layout(&paths)?;
    let config = load_config(&paths.config_path)?;
    Ok(Session { paths, config })
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        work_dir: runtime.work_dir.clone(),
        config: runtime.config.clone(),
    };
    resolve_paths(&context, &overrides)
}

fn print_slurp_report(report: &SlurpReport) {
    println!("fetch.pages: {}", report.pages);
    println!("fetch.revisions: {}", report.revisions);
    if report.histories_at_limit.is_empty() {
        println!("fetch.histories_at_limit: <none>");
    } else {
        for page in &report.histories_at_limit {
            println!("fetch.histories_at_limit.page: {page}");
        }
    }
}

fn print_replay_report(report: &ReplayReport) {
    println!("replay.pages: {}", report.pages);
    println!("replay.commits: {}", report.commits);
    println!("replay.skipped: {}", report.skipped);
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
