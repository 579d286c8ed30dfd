//! Command-line interface for the statcard binary.
//!
//! `update` (also the default when no subcommand is given) refreshes the card;
//! `check` validates the configuration and template without touching the
//! network.

use std::{
    io,
    path::{Path, PathBuf},
    process,
};

use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use statcard::{
    CacheStore, CardConfig, Error, GitHubClient, Overrides, RunOptions, Settings, SvgDocument,
    failure_summary, load_card_config,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Command line interface for refreshing a GitHub statistics card.
#[derive(Debug, Parser,)]
#[command(name = "statcard", version, about = "Update a GitHub statistics SVG card")]
struct Cli
{
    #[command(subcommand)]
    command: Option<Command,>,

    /// Arguments for the default `update` behavior.
    #[command(flatten)]
    legacy: UpdateArgs,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long = "verbose", short = 'v', global = true, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Debug, Subcommand,)]
enum Command
{
    /// Fetch statistics and rewrite the card.
    Update(UpdateArgs,),
    /// Validate settings, template ids and cache freshness offline.
    Check(CheckArgs,),
}

/// Arguments accepted by `update` and by the bare invocation.
#[derive(Debug, Args, Default,)]
struct UpdateArgs
{
    /// Optional YAML card document.
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf,>,

    /// GitHub login to render.
    #[arg(long = "user", env = "STATCARD_USER", value_name = "NAME")]
    user: Option<String,>,

    /// SVG template rewritten in place.
    #[arg(long = "svg", value_name = "PATH")]
    svg: Option<PathBuf,>,

    /// JSON cache file.
    #[arg(long = "cache", value_name = "PATH")]
    cache: Option<PathBuf,>,

    /// Skip writing `<svg>.bak` before rewriting the card.
    #[arg(long = "no-backup", action = ArgAction::SetTrue)]
    no_backup: bool,

    /// Recompute even when the cached statistics are fresh.
    #[arg(long = "force", action = ArgAction::SetTrue)]
    force: bool,

    #[arg(long = "token", env = "GITHUB_TOKEN", hide = true, hide_env_values = true)]
    token: Option<String,>,

    /// Birth date as YYYY-MM-DD or an RFC 3339 timestamp.
    #[arg(long = "dob", env = "DOB_ISO", value_name = "DATE")]
    birth_date: Option<String,>,
}

impl UpdateArgs
{
    fn overrides(&self,) -> Overrides
    {
        Overrides {
            token:      self.token.clone(),
            birth_date: self.birth_date.clone(),
            username:   self.user.clone(),
            svg_path:   self.svg.clone(),
            cache_path: self.cache.clone(),
            no_backup:  self.no_backup,
        }
    }
}

#[derive(Debug, Args, Default,)]
struct CheckArgs
{
    /// Optional YAML card document.
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf,>,

    /// GitHub login to render.
    #[arg(long = "user", env = "STATCARD_USER", value_name = "NAME")]
    user: Option<String,>,

    /// SVG template to inspect.
    #[arg(long = "svg", value_name = "PATH")]
    svg: Option<PathBuf,>,

    /// JSON cache file to inspect.
    #[arg(long = "cache", value_name = "PATH")]
    cache: Option<PathBuf,>,

    /// Birth date as YYYY-MM-DD or an RFC 3339 timestamp.
    #[arg(long = "dob", env = "DOB_ISO", value_name = "DATE")]
    birth_date: Option<String,>,
}

impl CheckArgs
{
    fn overrides(&self,) -> Overrides
    {
        Overrides {
            birth_date: self.birth_date.clone(),
            username: self.user.clone(),
            svg_path: self.svg.clone(),
            cache_path: self.cache.clone(),
            ..Overrides::default()
        }
    }
}

/// Findings of the offline health check.
#[derive(Debug, Default, PartialEq, Eq,)]
struct HealthReport
{
    present:     Vec<String,>,
    missing:     Vec<String,>,
    cache_fresh: bool,
}

/// Entry point that reports errors and sets the appropriate exit status.
#[tokio::main]
async fn main()
{
    let cli = Cli::parse();
    init_tracing(cli.verbose,);

    if let Err(e,) = run(cli,).await {
        error!("{}", failure_summary(&e));
        process::exit(1,);
    }
}

fn init_tracing(verbose: bool,)
{
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level,),);

    tracing_subscriber::registry().with(filter,).with(fmt::layer().with_writer(io::stderr,),).init();
}

/// Executes the CLI using parsed arguments.
///
/// # Errors
///
/// Propagates configuration, template and unrecovered data-source errors.
async fn run(cli: Cli,) -> Result<(), Error,>
{
    match cli.command {
        Some(Command::Update(args,),) => run_update(args,).await,
        Some(Command::Check(args,),) => run_check(&args, Utc::now(),).map(|_| (),),
        None => run_update(cli.legacy,).await,
    }
}

fn resolve_settings(config: Option<&Path,>, overrides: Overrides,) -> Result<Settings, Error,>
{
    let card = match config {
        Some(path,) => load_card_config(path,)?,
        None => CardConfig::default(),
    };
    Settings::resolve(card, overrides,)
}

async fn run_update(args: UpdateArgs,) -> Result<(), Error,>
{
    let settings = resolve_settings(args.config.as_deref(), args.overrides(),)?;
    let client = GitHubClient::new(settings.require_token()?,)?;

    let options = RunOptions {
        force_refresh: args.force,
    };
    let report = statcard::run(&settings, &client, options, Utc::now(),).await?;

    info!(
        "Card {} updated from {:?} statistics: {} fields written, {} missing",
        settings.svg_path.display(),
        report.origin,
        report.svg.updated.len(),
        report.svg.missing.len()
    );
    Ok((),)
}

fn run_check(args: &CheckArgs, now: DateTime<Utc,>,) -> Result<HealthReport, Error,>
{
    let settings = resolve_settings(args.config.as_deref(), args.overrides(),)?;
    info!("Configuration is valid for {}", settings.username);

    let doc = SvgDocument::load(&settings.svg_path,)?;
    let mut report = HealthReport::default();
    for slot in settings.layout.slots() {
        if doc.contains_id(&slot.id,)? {
            report.present.push(slot.id.clone(),);
        } else {
            warn!("Template {} has no '{}' element", settings.svg_path.display(), slot.id);
            report.missing.push(slot.id.clone(),);
        }
    }
    info!(
        "Template {}: {} of {} ids present",
        settings.svg_path.display(),
        report.present.len(),
        settings.layout.slots().len()
    );

    let cache = CacheStore::new(&settings.cache_path,).load();
    report.cache_fresh = cache.fresh_stats(now, settings.freshness,).is_some();
    match cache.last_updated {
        Some(at,) if report.cache_fresh => info!("Cached statistics from {} are fresh", at),
        Some(at,) => info!("Cached statistics from {} are stale", at),
        None => info!("No cached statistics at {}", settings.cache_path.display()),
    }

    Ok(report,)
}

#[cfg(test)]
mod tests
{
    use std::{fs, path::Path};

    use chrono::{TimeDelta, TimeZone, Utc};
    use clap::Parser;
    use statcard::{Cache, LinesOfCode, StatsRecord};
    use tempfile::tempdir;

    use super::{CheckArgs, Cli, Command, UpdateArgs, run_check, run_update};

    #[test]
    fn cli_accepts_legacy_update_invocation()
    {
        let cli = Cli::try_parse_from([
            env!("CARGO_PKG_NAME"),
            "--user",
            "octocat",
            "--svg",
            "dark_mode.svg",
            "--force",
        ],)
        .expect("failed to parse CLI",);

        assert!(cli.command.is_none());
        assert_eq!(cli.legacy.user.as_deref(), Some("octocat"));
        assert_eq!(cli.legacy.svg.as_deref(), Some(Path::new("dark_mode.svg")));
        assert!(cli.legacy.force);
        assert!(!cli.legacy.no_backup);
    }

    #[test]
    fn check_subcommand_parses_paths()
    {
        let cli = Cli::try_parse_from([
            env!("CARGO_PKG_NAME"),
            "check",
            "--config",
            "card.yaml",
            "--cache",
            "cache.json",
            "--verbose",
        ],)
        .expect("failed to parse CLI",);

        assert!(cli.verbose);
        match cli.command {
            Some(Command::Check(args,),) => {
                assert_eq!(args.config.as_deref(), Some(Path::new("card.yaml")));
                assert_eq!(args.cache.as_deref(), Some(Path::new("cache.json")));
            }
            other => panic!("expected check command, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_without_token_fails_fast()
    {
        let args = UpdateArgs {
            user: Some("octocat".into(),), ..UpdateArgs::default()
        };
        let error = run_update(args,).await.expect_err("token is required",);

        match error {
            statcard::Error::Config {
                message,
            } => assert!(message.contains("GITHUB_TOKEN")),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn check_reports_template_ids_and_cache_state()
    {
        let temp = tempdir().expect("failed to create tempdir",);
        let svg = temp.path().join("card.svg",);
        let cache_path = temp.path().join("stats.json",);
        fs::write(&svg, r#"<svg><tspan id="repo_data">0</tspan><tspan id="age_data"/></svg>"#,)
            .expect("write template",);

        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0,).unwrap();
        let mut cache = Cache::default();
        cache.record_stats(
            StatsRecord {
                repo_count:        1,
                contributed_count: 0,
                star_total:        0,
                follower_count:    0,
                commit_count:      0,
                lines_of_code:     LinesOfCode::default(),
                age_text:          "—".into(),
                computed_at:       now,
            },
            now - TimeDelta::hours(1,),
        );
        statcard::CacheStore::new(&cache_path,).save(&cache,).expect("save cache",);

        let args = CheckArgs {
            user: Some("octocat".into(),),
            svg: Some(svg,),
            cache: Some(cache_path,),
            ..CheckArgs::default()
        };
        let report = run_check(&args, now,).expect("check succeeds",);

        assert_eq!(report.present, vec!["age_data".to_owned(), "repo_data".to_owned()]);
        assert!(report.missing.contains(&"star_data".to_owned()));
        assert!(report.cache_fresh);
    }

    #[test]
    fn check_fails_for_missing_template()
    {
        let temp = tempdir().expect("failed to create tempdir",);
        let args = CheckArgs {
            user: Some("octocat".into(),),
            svg: Some(temp.path().join("absent.svg",),),
            ..CheckArgs::default()
        };

        let error = run_check(&args, Utc::now(),).expect_err("template is missing",);
        assert!(matches!(error, statcard::Error::NotFound { .. }));
    }
}
