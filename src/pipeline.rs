// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// End-to-end card refresh: cache check, fetch, aggregate, fallback, write.
///
/// Every stage runs sequentially. A data-source failure degrades to the
/// last cached record, then to the configured fallback values; template and
/// file system failures always abort the run.
use std::io::IsTerminal;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    age::human_age,
    cache::{Cache, CacheStore},
    config::{CommitSource, LocStrategy, Settings},
    error::Error,
    github::{GitHubSource, Repository},
    loc::measure_history,
    retry::retry_with_backoff,
    stats::{self, SourceSnapshot, StatsRecord},
    svg::{UpdateReport, update_card},
};

/// Per-invocation switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq,)]
pub struct RunOptions
{
    /// Recompute even when the cached record is still fresh.
    pub force_refresh: bool,
}

/// Where the statistics written to the card came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq,)]
pub enum StatsOrigin
{
    Fresh,
    Cached,
    /// Cached record reused because GitHub could not be queried.
    StaleCache,
    Fallback,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq,)]
pub struct RunReport
{
    pub stats:  StatsRecord,
    pub origin: StatsOrigin,
    pub svg:    UpdateReport,
}

/// Refreshes the card at `settings.svg_path`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the template is missing, [`Error::Io`]
/// when it cannot be written, and the data-source error when GitHub fails
/// and neither a cached record nor fallback values are available.
pub async fn run<S,>(
    settings: &Settings,
    source: &S,
    options: RunOptions,
    now: DateTime<Utc,>,
) -> Result<RunReport, Error,>
where
    S: GitHubSource,
{
    if !settings.svg_path.exists() {
        return Err(Error::not_found(format!("SVG template {}", settings.svg_path.display()),),);
    }

    let store = CacheStore::new(&settings.cache_path,);
    let mut cache = store.load();
    info!("Loaded cache from {} ({} repositories)", store.path().display(), cache.repos.len());

    let cached = if options.force_refresh {
        debug!("Forced refresh, ignoring cached statistics");
        None
    } else {
        cache.fresh_stats(now, settings.freshness,).cloned()
    };

    let (stats, origin,) = match cached {
        Some(stats,) => {
            info!("Cached statistics from {} are still fresh", stats.computed_at);
            (stats, StatsOrigin::Cached,)
        }
        None => match collect_stats(settings, source, &mut cache, now,).await {
            Ok(stats,) => {
                cache.record_stats(stats.clone(), now,);
                if let Err(e,) = store.save(&cache,) {
                    warn!("Failed to save cache: {}", e);
                }
                (stats, StatsOrigin::Fresh,)
            }
            Err(error,) if error.is_data_source() => degrade(settings, &cache, error, now,)?,
            Err(error,) => return Err(error,),
        },
    };

    info!("Writing statistics to {}", settings.svg_path.display());
    let svg = update_card(&settings.svg_path, &stats, &settings.layout, settings.backup,)?;

    Ok(RunReport {
        stats,
        origin,
        svg,
    },)
}

/// Fetches everything from GitHub and aggregates a fresh [`StatsRecord`].
///
/// Repository entries in `cache` are refreshed as a side effect.
///
/// # Errors
///
/// Returns the first data-source error that survives the retry policy.
pub async fn collect_stats<S,>(
    settings: &Settings,
    source: &S,
    cache: &mut Cache,
    now: DateTime<Utc,>,
) -> Result<StatsRecord, Error,>
where
    S: GitHubSource,
{
    let user = settings.username.as_str();

    info!("Fetching GitHub data for {}", user);
    let profile =
        retry_with_backoff(&settings.retry, "fetch user profile", || source.user_profile(user,),)
            .await?;
    let repositories =
        retry_with_backoff(&settings.retry, "list repositories", || source.list_repositories(user,),)
            .await?;
    let contributions = retry_with_backoff(&settings.retry, "fetch contribution totals", || {
        source.contribution_totals(user,)
    },)
    .await?;
    info!(
        "Fetched {} repositories and {} followers for {}",
        repositories.len(),
        profile.follower_count,
        user
    );

    let snapshot = SourceSnapshot {
        profile,
        repositories,
        contributions,
    };

    let pb = progress_spinner();
    let per_repository_total =
        refresh_repositories(settings, source, cache, &snapshot.repositories, &pb,).await;
    let commits = stats::commit_count(&snapshot, settings.commit_source, per_repository_total,);

    let measured = if settings.loc_strategy == LocStrategy::GitHistory {
        Some(measure_history(&snapshot.repositories, &settings.work_dir, settings.throttle, &pb,).await,)
    } else {
        None
    };
    pb.finish_and_clear();

    info!("Aggregating statistics for {}", user);
    let lines_of_code = stats::resolve_lines_of_code(
        settings.loc_strategy,
        &snapshot,
        commits,
        &settings.estimation,
        measured,
    );
    let age_text = human_age(settings.birth_date, now.date_naive(),);

    Ok(stats::aggregate(&snapshot, commits, lines_of_code, age_text, now,),)
}

/// Brings stale repository entries up to date and returns the summed commit
/// count of owned repositories.
///
/// Only counts that were actually fetched are persisted. An owned repository
/// without a fetched count is looked up again, even when its entry is current.
async fn refresh_repositories<S,>(
    settings: &Settings,
    source: &S,
    cache: &mut Cache,
    repositories: &[Repository],
    pb: &ProgressBar,
) -> u64
where
    S: GitHubSource,
{
    let per_repository = settings.commit_source == CommitSource::PerRepository;
    let mut total = 0u64;
    let mut requests = 0usize;
    let mut refreshed = 0usize;

    for repo in repositories {
        if !per_repository || repo.is_fork {
            if cache.refresh_repo(repo, None,) {
                refreshed += 1;
            }
            continue;
        }

        let cached = cache.commit_count_for(repo,).filter(|_| !cache.needs_commit_lookup(repo,),);
        let commits = match cached {
            Some(commits,) => commits,
            None => {
                pb.set_message(format!("Refreshing {}...", repo.full_name),);
                if requests > 0 {
                    sleep(settings.throttle,).await;
                }
                requests += 1;
                refreshed += 1;

                let (owner, name,) = repo.owner_and_name();
                match source.repository_commit_count(owner, name,).await {
                    Ok(commits,) => {
                        cache.store_repo(repo, Some(commits,),);
                        commits
                    }
                    Err(e,) => {
                        warn!("Commit count lookup for {} failed: {}", repo.full_name, e);
                        cache.store_repo(repo, None,);
                        0
                    }
                }
            }
        };
        total = total.saturating_add(commits,);
    }

    debug!("Refreshed {} of {} cached repositories", refreshed, repositories.len());
    total
}

fn degrade(
    settings: &Settings,
    cache: &Cache,
    error: Error,
    now: DateTime<Utc,>,
) -> Result<(StatsRecord, StatsOrigin,), Error,>
{
    if let Some(stats,) = &cache.stats {
        warn!("GitHub unavailable ({}), reusing statistics from {}", error, stats.computed_at);
        return Ok((stats.clone(), StatsOrigin::StaleCache,),);
    }

    match &settings.fallback {
        Some(fallback,) => {
            warn!("GitHub unavailable ({}) and nothing cached, writing fallback values", error);
            let age_text = human_age(settings.birth_date, now.date_naive(),);
            Ok((StatsRecord::from_fallback(fallback, age_text, now,), StatsOrigin::Fallback,),)
        }
        None => Err(error,),
    }
}

fn progress_spinner() -> ProgressBar
{
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    match ProgressStyle::default_spinner().template("{spinner:.yellow} [{elapsed_precise}] {msg}",) {
        Ok(style,) => pb.set_style(style,),
        Err(e,) => debug!("Falling back to the default spinner style: {}", e),
    }
    pb
}

#[cfg(test)]
mod tests
{
    use std::{cell::Cell, fs, path::Path};

    use chrono::{TimeDelta, TimeZone};
    use tempfile::{TempDir, tempdir};

    use super::*;
    use crate::{
        config::{CardConfig, Overrides},
        github::{ContributionTotals, UserProfile},
        loc::LinesOfCode,
        retry::RetryConfig,
    };

    const TEMPLATE: &str = r#"<svg><text><tspan id="repo_data">0</tspan> <tspan id="star_data">0</tspan> <tspan id="commit_data">0</tspan> <tspan id="loc_data">0</tspan></text></svg>"#;

    struct FakeSource
    {
        transient_failures: Cell<u32,>,
        unavailable:        bool,
        calls:              Cell<u32,>,
        commit_lookups:     Cell<u32,>,
        commit_failures:    Cell<u32,>,
    }

    impl FakeSource
    {
        fn healthy() -> Self
        {
            Self {
                transient_failures: Cell::new(0,),
                unavailable:        false,
                calls:              Cell::new(0,),
                commit_lookups:     Cell::new(0,),
                commit_failures:    Cell::new(0,),
            }
        }

        fn unavailable() -> Self
        {
            Self {
                unavailable: true, ..Self::healthy()
            }
        }

        fn check(&self,) -> Result<(), Error,>
        {
            self.calls.set(self.calls.get() + 1,);
            if self.unavailable {
                return Err(Error::RateLimited {
                    message: "API rate limit exceeded".into(),
                },);
            }
            if self.transient_failures.get() > 0 {
                self.transient_failures.set(self.transient_failures.get() - 1,);
                return Err(Error::transient("connection reset",),);
            }
            Ok((),)
        }
    }

    fn repo(name: &str, fork: bool, stars: u64,) -> Repository
    {
        Repository {
            name: name.to_owned(),
            full_name: format!("octocat/{name}"),
            is_fork: fork,
            star_count: stars,
            updated_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0,).unwrap(),
            size_kb: 100,
            primary_language: Some("Rust".into(),),
        }
    }

    impl GitHubSource for FakeSource
    {
        async fn user_profile(&self, username: &str,) -> Result<UserProfile, Error,>
        {
            self.check()?;
            Ok(UserProfile {
                login: username.to_owned(), follower_count: 7,
            },)
        }

        async fn list_repositories(&self, _username: &str,) -> Result<Vec<Repository,>, Error,>
        {
            self.check()?;
            Ok(vec![
                repo("a", false, 5,),
                repo("b", false, 10,),
                repo("c", false, 0,),
                repo("fork-1", true, 3,),
                repo("fork-2", true, 0,),
            ],)
        }

        async fn contribution_totals(&self, _username: &str,) -> Result<ContributionTotals, Error,>
        {
            self.check()?;
            Ok(ContributionTotals {
                commit_contributions: 120, ..ContributionTotals::default()
            },)
        }

        async fn repository_commit_count(&self, _owner: &str, name: &str,) -> Result<u64, Error,>
        {
            self.commit_lookups.set(self.commit_lookups.get() + 1,);
            if self.commit_failures.get() > 0 {
                self.commit_failures.set(self.commit_failures.get() - 1,);
                return Err(Error::service("Something went wrong while executing your query",),);
            }
            Ok(if name == "a" { 40 } else { 10 },)
        }
    }

    fn now() -> DateTime<Utc,>
    {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0,).unwrap()
    }

    fn workspace(card_yaml: &str,) -> (TempDir, Settings,)
    {
        let temp = tempdir().expect("failed to create tempdir",);
        fs::write(temp.path().join("card.svg",), TEMPLATE,).expect("write template",);

        let mut card: CardConfig = serde_yaml::from_str(card_yaml,).expect("valid yaml",);
        card.svg_path = Some(temp.path().join("card.svg",),);
        card.cache_path = Some(temp.path().join("cache/stats.json",),);
        card.work_dir = Some(temp.path().join("repos",),);
        card.throttle_ms = Some(0,);
        card.retry = Some(RetryConfig {
            max_attempts: 3, initial_delay_ms: 10, backoff_factor: 2.0, max_delay_ms: 100,
        },);

        let overrides = Overrides {
            username: Some("octocat".into(),),
            birth_date: Some("1995-03-10".into(),),
            ..Overrides::default()
        };
        let settings = Settings::resolve(card, overrides,).expect("valid settings",);
        (temp, settings,)
    }

    fn cached_record(computed_at: DateTime<Utc,>,) -> StatsRecord
    {
        StatsRecord {
            repo_count: 11,
            contributed_count: 1,
            star_total: 222,
            follower_count: 3,
            commit_count: 4_000,
            lines_of_code: LinesOfCode::from_changes(5_000, 1_000,),
            age_text: "cached".into(),
            computed_at,
        }
    }

    fn seed_cache(path: &Path, computed_at: DateTime<Utc,>,)
    {
        let mut cache = Cache::default();
        cache.record_stats(cached_record(computed_at,), computed_at,);
        CacheStore::new(path,).save(&cache,).expect("seed cache",);
    }

    fn card_text(settings: &Settings,) -> String
    {
        fs::read_to_string(&settings.svg_path,).expect("read card",)
    }

    #[tokio::test]
    async fn fresh_run_aggregates_and_persists()
    {
        let (_temp, settings,) = workspace("{}",);
        let source = FakeSource::healthy();

        let report = run(&settings, &source, RunOptions::default(), now(),).await.expect("run",);

        assert_eq!(report.origin, StatsOrigin::Fresh);
        assert_eq!(report.stats.repo_count, 3);
        assert_eq!(report.stats.contributed_count, 2);
        assert_eq!(report.stats.star_total, 15);
        assert_eq!(report.stats.follower_count, 7);
        assert_eq!(report.stats.commit_count, 120);
        assert_eq!(report.stats.lines_of_code, LinesOfCode { total: 6000, added: 6900, deleted: 900 });
        assert_eq!(report.stats.age_text, "30 years, 0 months, 0 days");
        assert_eq!(source.commit_lookups.get(), 0);

        let card = card_text(&settings,);
        assert!(card.contains(r#"<tspan id="repo_data">3</tspan>"#));
        assert!(card.contains(r#"<tspan id="loc_data">6,000</tspan>"#));

        let cache = CacheStore::new(&settings.cache_path,).load();
        assert_eq!(cache.stats.as_ref(), Some(&report.stats));
        assert_eq!(cache.last_updated, Some(now()));
        assert_eq!(cache.repos.len(), 5);
    }

    #[tokio::test]
    async fn fresh_cache_is_reused_without_network()
    {
        let (_temp, settings,) = workspace("{}",);
        seed_cache(&settings.cache_path, now() - TimeDelta::hours(2,),);
        let source = FakeSource::unavailable();

        let report = run(&settings, &source, RunOptions::default(), now(),).await.expect("run",);

        assert_eq!(report.origin, StatsOrigin::Cached);
        assert_eq!(report.stats, cached_record(now() - TimeDelta::hours(2)));
        assert_eq!(source.calls.get(), 0);
        assert!(card_text(&settings).contains(r#"<tspan id="star_data">222</tspan>"#));
    }

    #[tokio::test]
    async fn forced_refresh_ignores_fresh_cache()
    {
        let (_temp, settings,) = workspace("{}",);
        seed_cache(&settings.cache_path, now() - TimeDelta::hours(2,),);

        let report = run(
            &settings,
            &FakeSource::healthy(),
            RunOptions {
                force_refresh: true,
            },
            now(),
        )
        .await
        .expect("run",);

        assert_eq!(report.origin, StatsOrigin::Fresh);
        assert_eq!(report.stats.star_total, 15);
    }

    #[tokio::test]
    async fn stale_cache_covers_for_unavailable_github()
    {
        let (_temp, settings,) = workspace("{}",);
        let computed_at = now() - TimeDelta::days(3,);
        seed_cache(&settings.cache_path, computed_at,);

        let report =
            run(&settings, &FakeSource::unavailable(), RunOptions::default(), now(),).await.expect("run",);

        assert_eq!(report.origin, StatsOrigin::StaleCache);
        assert_eq!(report.stats, cached_record(computed_at));
    }

    #[tokio::test]
    async fn configured_fallback_is_written_when_nothing_is_cached()
    {
        let (_temp, settings,) = workspace("fallback:\n  repo_count: 99\n  star_total: 1234\n",);

        let report =
            run(&settings, &FakeSource::unavailable(), RunOptions::default(), now(),).await.expect("run",);

        assert_eq!(report.origin, StatsOrigin::Fallback);
        assert_eq!(report.stats.repo_count, 99);
        assert!(card_text(&settings).contains(r#"<tspan id="star_data">1,234</tspan>"#));
        assert!(CacheStore::new(&settings.cache_path).load().stats.is_none());
    }

    #[tokio::test]
    async fn disabled_fallback_propagates_the_error()
    {
        let (_temp, settings,) = workspace("fallback_enabled: false\n",);

        let error = run(&settings, &FakeSource::unavailable(), RunOptions::default(), now(),)
            .await
            .expect_err("no fallback available",);

        assert!(matches!(error, Error::RateLimited { .. }));
        assert_eq!(card_text(&settings), TEMPLATE);
    }

    #[tokio::test]
    async fn missing_template_aborts_before_fetching()
    {
        let (_temp, settings,) = workspace("{}",);
        fs::remove_file(&settings.svg_path,).expect("remove template",);
        let source = FakeSource::healthy();

        let error = run(&settings, &source, RunOptions::default(), now(),)
            .await
            .expect_err("template is missing",);

        assert!(matches!(error, Error::NotFound { .. }));
        assert_eq!(source.calls.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried()
    {
        let (_temp, settings,) = workspace("{}",);
        let source = FakeSource::healthy();
        source.transient_failures.set(2,);

        let report = run(&settings, &source, RunOptions::default(), now(),).await.expect("run",);

        assert_eq!(report.origin, StatsOrigin::Fresh);
        assert_eq!(source.calls.get(), 5);
    }

    #[tokio::test]
    async fn per_repository_commits_sum_owned_history()
    {
        let (_temp, settings,) = workspace("commit_source: per_repository\n",);
        let source = FakeSource::healthy();

        let report = run(&settings, &source, RunOptions::default(), now(),).await.expect("run",);

        assert_eq!(report.stats.commit_count, 40 + 10 + 10);
        assert_eq!(source.commit_lookups.get(), 3);

        let second = run(
            &settings,
            &source,
            RunOptions {
                force_refresh: true,
            },
            now(),
        )
        .await
        .expect("second run",);
        assert_eq!(second.stats.commit_count, 60);
        assert_eq!(source.commit_lookups.get(), 3);
    }

    #[tokio::test]
    async fn switching_to_per_repository_fetches_counts_for_current_entries()
    {
        let (_temp, settings,) = workspace("{}",);
        let source = FakeSource::healthy();

        let first = run(&settings, &source, RunOptions::default(), now(),).await.expect("run",);
        assert_eq!(first.stats.commit_count, 120);
        assert_eq!(source.commit_lookups.get(), 0);
        let cache = CacheStore::new(&settings.cache_path,).load();
        assert!(cache.repos.values().all(|entry| entry.commit_count.is_none()));

        let mut per_repository = settings.clone();
        per_repository.commit_source = CommitSource::PerRepository;

        let second = run(
            &per_repository,
            &source,
            RunOptions {
                force_refresh: true,
            },
            now(),
        )
        .await
        .expect("second run",);

        assert_eq!(second.stats.commit_count, 60);
        assert_eq!(source.commit_lookups.get(), 3);
    }

    #[tokio::test]
    async fn failed_commit_lookup_is_retried_on_the_next_run()
    {
        let (_temp, settings,) = workspace("commit_source: per_repository\n",);
        let source = FakeSource::healthy();
        source.commit_failures.set(1,);

        let first = run(&settings, &source, RunOptions::default(), now(),).await.expect("run",);
        assert_eq!(first.stats.commit_count, 10 + 10);
        assert_eq!(source.commit_lookups.get(), 3);
        let cache = CacheStore::new(&settings.cache_path,).load();
        assert_eq!(cache.commit_count_for(&repo("a", false, 5,)), None);

        let second = run(
            &settings,
            &source,
            RunOptions {
                force_refresh: true,
            },
            now(),
        )
        .await
        .expect("second run",);

        assert_eq!(second.stats.commit_count, 60);
        assert_eq!(source.commit_lookups.get(), 4);
    }
}
