// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Persisted JSON cache of per-repository data and the last computed
//! [`StatsRecord`].
//!
//! Loading never fails: an absent or damaged file yields an empty cache so
//! a run can always proceed to the network. Repository entries are keyed by
//! the SHA-256 of `owner/name` and are never removed.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{
    error::{self, Error},
    github::Repository,
    stats::StatsRecord,
};

/// Cached view of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
pub struct RepoCacheEntry
{
    pub full_name:        String,
    /// Default-branch commit count, present only when it was fetched.
    #[serde(default)]
    pub commit_count:     Option<u64,>,
    /// `updated_at` reported by GitHub when the entry was written.
    pub last_updated:     DateTime<Utc,>,
    pub star_count:       u64,
    pub size_kb:          u64,
    pub primary_language: Option<String,>,
    pub is_fork:          bool,
}

/// Contents of the cache file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize,)]
pub struct Cache
{
    #[serde(default)]
    pub repos:        BTreeMap<String, RepoCacheEntry,>,
    /// Time of the last successful full computation.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc,>,>,
    #[serde(default)]
    pub stats:        Option<StatsRecord,>,
}

/// Stable cache key for a repository: lowercase hex SHA-256 of `owner/name`.
pub fn repo_key(full_name: &str,) -> String
{
    let mut hasher = Sha256::new();
    hasher.update(full_name.as_bytes(),);
    format!("{:x}", hasher.finalize())
}

impl Cache
{
    /// Whether the last full computation is younger than `window`.
    pub fn is_fresh(&self, now: DateTime<Utc,>, window: Duration,) -> bool
    {
        let Some(last_updated,) = self.last_updated else {
            return false;
        };
        let Ok(window,) = TimeDelta::from_std(window,) else {
            return true;
        };
        now.signed_duration_since(last_updated,) < window
    }

    /// Stats that may be reused as-is for a run at `now`.
    pub fn fresh_stats(&self, now: DateTime<Utc,>, window: Duration,) -> Option<&StatsRecord,>
    {
        self.stats.as_ref().filter(|_| self.is_fresh(now, window,),)
    }

    /// Whether the entry for `repo` is absent or older than the source.
    pub fn needs_refresh(&self, repo: &Repository,) -> bool
    {
        match self.repos.get(&repo_key(&repo.full_name,),) {
            Some(entry,) => repo.updated_at > entry.last_updated,
            None => true,
        }
    }

    /// Whether a commit count must be fetched for `repo`: the entry is stale
    /// or no count was ever fetched for it.
    pub fn needs_commit_lookup(&self, repo: &Repository,) -> bool
    {
        self.needs_refresh(repo,) || self.commit_count_for(repo,).is_none()
    }

    /// Writes the entry for `repo` unconditionally.
    pub fn store_repo(&mut self, repo: &Repository, commit_count: Option<u64,>,)
    {
        self.repos.insert(
            repo_key(&repo.full_name,),
            RepoCacheEntry {
                full_name: repo.full_name.clone(),
                commit_count,
                last_updated: repo.updated_at,
                star_count: repo.star_count,
                size_kb: repo.size_kb,
                primary_language: repo.primary_language.clone(),
                is_fork: repo.is_fork,
            },
        );
    }

    /// Stores the entry only when [`Cache::needs_refresh`] holds; returns
    /// whether it was written.
    pub fn refresh_repo(&mut self, repo: &Repository, commit_count: Option<u64,>,) -> bool
    {
        if !self.needs_refresh(repo,) {
            return false;
        }
        self.store_repo(repo, commit_count,);
        true
    }

    /// Fetched commit count of `repo`, if any.
    pub fn commit_count_for(&self, repo: &Repository,) -> Option<u64,>
    {
        self.repos.get(&repo_key(&repo.full_name,),).and_then(|entry| entry.commit_count,)
    }

    /// Records a successful computation.
    pub fn record_stats(&mut self, stats: StatsRecord, now: DateTime<Utc,>,)
    {
        self.stats = Some(stats,);
        self.last_updated = Some(now,);
    }
}

/// File-backed storage for [`Cache`].
#[derive(Debug, Clone,)]
pub struct CacheStore
{
    path: PathBuf,
}

impl CacheStore
{
    pub fn new(path: impl Into<PathBuf,>,) -> Self
    {
        Self {
            path: path.into(),
        }
    }

    pub fn path(&self,) -> &Path
    {
        &self.path
    }

    /// Reads the cache, returning an empty one when the file is missing or
    /// cannot be decoded.
    pub fn load(&self,) -> Cache
    {
        if !self.path.exists() {
            debug!("No cache at {}, starting empty", self.path.display());
            return Cache::default();
        }

        let contents = match fs::read_to_string(&self.path,) {
            Ok(contents,) => contents,
            Err(e,) => {
                warn!("Failed to read cache {}: {}", self.path.display(), e);
                return Cache::default();
            }
        };

        match serde_json::from_str(&contents,) {
            Ok(cache,) => cache,
            Err(e,) => {
                warn!("Ignoring corrupt cache {}: {}", self.path.display(), e);
                Cache::default()
            }
        }
    }

    /// Overwrites the cache file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the directory or file cannot be written and
    /// [`Error::Serialize`] when encoding fails.
    pub fn save(&self, cache: &Cache,) -> Result<(), Error,>
    {
        if let Some(parent,) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent,).map_err(|source| error::io_error(parent, source,),)?;
        }

        let contents = serde_json::to_string_pretty(cache,)?;
        fs::write(&self.path, contents,).map_err(|source| error::io_error(&self.path, source,),)?;
        debug!("Saved cache with {} repositories to {}", cache.repos.len(), self.path.display());
        Ok((),)
    }
}
