// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// Lines-of-code figures for the card.
///
/// The estimators are rough. Only [`measure_history`] reports real numbers,
/// and it clones every owned repository to get them.
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tokio::{process::Command, time::sleep};
use tracing::{debug, info, warn};

use crate::github::Repository;

/// Added, deleted and net line counts. `total == added - deleted`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,)]
pub struct LinesOfCode
{
    pub total:   u64,
    pub added:   u64,
    pub deleted: u64,
}

impl LinesOfCode
{
    /// Builds the triple from measured additions and deletions.
    pub fn from_changes(added: u64, deleted: u64,) -> Self
    {
        Self {
            total: added.saturating_sub(deleted,), added, deleted,
        }
    }

    /// Splits a net total into added and deleted using a fixed ratio.
    ///
    /// `added = total * added_ratio_percent / 100`, clamped to `u64::MAX`,
    /// and `deleted` is whatever makes the triple consistent.
    pub fn from_net_total(total: u64, added_ratio_percent: u64,) -> Self
    {
        let ratio = added_ratio_percent.max(100,);
        let added = u64::try_from(u128::from(total,) * u128::from(ratio,) / 100,)
            .unwrap_or(u64::MAX,);
        Self {
            total, added, deleted: added - total,
        }
    }
}

/// Tunables for the estimation strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
#[serde(default, deny_unknown_fields)]
pub struct EstimationConstants
{
    /// Average net lines per commit (default: 50).
    pub lines_per_commit:    u64,
    /// Added lines as a percentage of the net total (default: 115).
    pub added_ratio_percent: u64,
    /// Lines per kilobyte of repository size before the language multiplier
    /// (default: 30).
    pub lines_per_kb:        u64,
    /// Share of the size-based estimate in the blend (default: 60).
    pub size_weight_percent: u64,
}

impl Default for EstimationConstants
{
    fn default() -> Self
    {
        Self {
            lines_per_commit:    50,
            added_ratio_percent: 115,
            lines_per_kb:        30,
            size_weight_percent: 60,
        }
    }
}

/// Estimates lines of code from the commit count alone.
pub fn estimate_from_commits(commits: u64, constants: &EstimationConstants,) -> LinesOfCode
{
    let total = commits.saturating_mul(constants.lines_per_commit,);
    LinesOfCode::from_net_total(total, constants.added_ratio_percent,)
}

/// Relative source density per primary language, in percent.
pub fn language_multiplier(language: Option<&str,>,) -> u64
{
    match language {
        Some("Java" | "C#" | "Kotlin",) => 130,
        Some("JavaScript" | "PHP",) => 120,
        Some("TypeScript" | "C++" | "Swift",) => 110,
        Some("Rust" | "Go" | "C" | "Ruby" | "Dart",) => 100,
        Some("Python" | "Shell" | "Lua",) => 90,
        Some("CSS" | "SCSS",) => 70,
        Some("HTML" | "Vue",) => 60,
        Some("Jupyter Notebook",) => 30,
        _ => 100,
    }
}

/// Blends a size-based estimate over owned repositories with the commit
/// estimate, weighted by `size_weight_percent`.
pub fn estimate_from_size(
    repositories: &[Repository],
    commits: u64,
    constants: &EstimationConstants,
) -> LinesOfCode
{
    let size_based: u64 = repositories
        .iter()
        .filter(|repo| !repo.is_fork,)
        .map(|repo| {
            repo.size_kb.saturating_mul(constants.lines_per_kb,).saturating_mul(
                language_multiplier(repo.primary_language.as_deref(),),
            ) / 100
        },)
        .fold(0u64, u64::saturating_add,);

    let commit_based = estimate_from_commits(commits, constants,).total;
    let weight = constants.size_weight_percent.min(100,);
    let blended = size_based
        .saturating_mul(weight,)
        .saturating_add(commit_based.saturating_mul(100 - weight,),)
        / 100;

    LinesOfCode::from_net_total(blended, constants.added_ratio_percent,)
}

/// Sums the additions and deletions of `git log --numstat` output.
///
/// Binary files report `-` in both columns and are skipped.
pub fn parse_numstat(output: &str,) -> (u64, u64,)
{
    let mut added = 0u64;
    let mut deleted = 0u64;

    for line in output.lines() {
        let mut parts = line.trim().split('\t',);
        let (Some(add,), Some(del,), Some(_path,), None,) =
            (parts.next(), parts.next(), parts.next(), parts.next(),)
        else {
            continue;
        };

        if let Ok(value,) = add.parse::<u64>() {
            added = added.saturating_add(value,);
        }
        if let Ok(value,) = del.parse::<u64>() {
            deleted = deleted.saturating_add(value,);
        }
    }

    (added, deleted,)
}

/// Clones each owned repository and sums its full `--numstat` history.
///
/// Repositories that fail to clone or log are skipped with a warning; the
/// work directory is wiped before and after use.
pub async fn measure_history(
    repositories: &[Repository],
    work_dir: &Path,
    throttle: Duration,
    progress: &ProgressBar,
) -> LinesOfCode
{
    reset_work_dir(work_dir,);

    let owned: Vec<&Repository,> = repositories.iter().filter(|repo| !repo.is_fork,).collect();
    let mut added = 0u64;
    let mut deleted = 0u64;

    info!("Measuring history of {} repositories in {}", owned.len(), work_dir.display());

    for (index, repo,) in owned.iter().enumerate() {
        if index > 0 {
            sleep(throttle,).await;
        }

        progress.set_message(format!("Cloning {}...", repo.full_name),);
        match repository_numstat(repo, work_dir,).await {
            Ok((repo_added, repo_deleted,),) => {
                debug!("{}: +{} -{}", repo.full_name, repo_added, repo_deleted);
                added = added.saturating_add(repo_added,);
                deleted = deleted.saturating_add(repo_deleted,);
            }
            Err(message,) => warn!("Skipping {}: {}", repo.full_name, message),
        }
        progress.inc(1,);
    }

    reset_work_dir(work_dir,);
    LinesOfCode::from_changes(added, deleted,)
}

async fn repository_numstat(repo: &Repository, work_dir: &Path,) -> Result<(u64, u64,), String,>
{
    let checkout = clone_target(work_dir, repo,);
    let url = format!("https://github.com/{}.git", repo.full_name);
    let checkout_arg = checkout.to_string_lossy();

    run_git(&["clone", "--quiet", &url, &checkout_arg], None,).await?;
    let log =
        run_git(&["log", "--pretty=tformat:", "--numstat"], Some(checkout.as_path(),),).await;

    if let Err(e,) = fs::remove_dir_all(&checkout,) {
        debug!("Failed to remove {}: {}", checkout.display(), e);
    }

    Ok(parse_numstat(&log?,),)
}

fn clone_target(work_dir: &Path, repo: &Repository,) -> PathBuf
{
    work_dir.join(repo.full_name.replace('/', "__",),)
}

fn reset_work_dir(work_dir: &Path,)
{
    if work_dir.exists()
        && let Err(e,) = fs::remove_dir_all(work_dir,)
    {
        warn!("Failed to clear {}: {}", work_dir.display(), e);
    }
    if let Err(e,) = fs::create_dir_all(work_dir,) {
        warn!("Failed to create {}: {}", work_dir.display(), e);
    }
}

async fn run_git(args: &[&str], cwd: Option<&Path,>,) -> Result<String, String,>
{
    let mut command = Command::new("git",);
    command.env("GIT_TERMINAL_PROMPT", "0",).args(args,).kill_on_drop(true,);
    if let Some(dir,) = cwd {
        command.current_dir(dir,);
    }

    let output = command.output().await.map_err(|e| format!("git command failed: {e}"),)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr,);
        return Err(format!("git {} failed: {}", args.join(" "), stderr.trim()),);
    }

    Ok(String::from_utf8_lossy(&output.stdout,).into_owned(),)
}
