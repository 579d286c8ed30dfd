// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// Aggregation of fetched GitHub data into the figures shown on the card.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::{CommitSource, FallbackStats, LocStrategy},
    github::{ContributionTotals, Repository, UserProfile},
    loc::{self, EstimationConstants, LinesOfCode},
};

/// Computed statistics for one user at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
pub struct StatsRecord
{
    /// Owned, non-fork repositories.
    pub repo_count:        u64,
    /// Forked repositories.
    pub contributed_count: u64,
    /// Stars across owned, non-fork repositories.
    pub star_total:        u64,
    pub follower_count:    u64,
    pub commit_count:      u64,
    pub lines_of_code:     LinesOfCode,
    pub age_text:          String,
    pub computed_at:       DateTime<Utc,>,
}

impl StatsRecord
{
    /// Builds a record from configured fallback values.
    pub fn from_fallback(
        fallback: &FallbackStats,
        age_text: String,
        computed_at: DateTime<Utc,>,
    ) -> Self
    {
        Self {
            repo_count: fallback.repo_count,
            contributed_count: fallback.contributed_count,
            star_total: fallback.star_total,
            follower_count: fallback.follower_count,
            commit_count: fallback.commit_count,
            lines_of_code: LinesOfCode::from_changes(fallback.loc_added, fallback.loc_deleted,),
            age_text,
            computed_at,
        }
    }
}

/// Raw data gathered from GitHub for a single run.
#[derive(Debug, Clone, PartialEq, Eq,)]
pub struct SourceSnapshot
{
    pub profile:       UserProfile,
    pub repositories:  Vec<Repository,>,
    pub contributions: ContributionTotals,
}

impl SourceSnapshot
{
    /// Repositories the user owns, forks excluded.
    pub fn owned(&self,) -> impl Iterator<Item = &Repository,>
    {
        self.repositories.iter().filter(|repo| !repo.is_fork,)
    }
}

/// Picks the commit figure for the configured source.
pub fn commit_count(
    snapshot: &SourceSnapshot,
    source: CommitSource,
    per_repository_total: u64,
) -> u64
{
    match source {
        CommitSource::Contributions => snapshot.contributions.commit_contributions,
        CommitSource::PerRepository => per_repository_total,
    }
}

/// Chooses the lines-of-code figure: a measured value wins, otherwise the
/// strategy's estimate. An unmeasured `GitHistory` run falls back to the
/// commit estimate.
pub fn resolve_lines_of_code(
    strategy: LocStrategy,
    snapshot: &SourceSnapshot,
    commits: u64,
    constants: &EstimationConstants,
    measured: Option<LinesOfCode,>,
) -> LinesOfCode
{
    if let Some(measured,) = measured {
        return measured;
    }

    match strategy {
        LocStrategy::SizeBlend => {
            loc::estimate_from_size(&snapshot.repositories, commits, constants,)
        }
        LocStrategy::CommitEstimate | LocStrategy::GitHistory => {
            loc::estimate_from_commits(commits, constants,)
        }
    }
}

/// Combines a snapshot with derived figures into a [`StatsRecord`].
pub fn aggregate(
    snapshot: &SourceSnapshot,
    commit_count: u64,
    lines_of_code: LinesOfCode,
    age_text: String,
    computed_at: DateTime<Utc,>,
) -> StatsRecord
{
    let (mut repo_count, mut contributed_count, mut star_total,) = (0u64, 0u64, 0u64,);

    for repo in &snapshot.repositories {
        if repo.is_fork {
            contributed_count += 1;
        } else {
            repo_count += 1;
            star_total = star_total.saturating_add(repo.star_count,);
        }
    }

    StatsRecord {
        repo_count,
        contributed_count,
        star_total,
        follower_count: snapshot.profile.follower_count,
        commit_count,
        lines_of_code,
        age_text,
        computed_at,
    }
}
