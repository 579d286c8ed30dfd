// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Configuration sources and the resolved [`Settings`] passed to each stage.
//!
//! Three layers are merged, highest precedence first: command line flags and
//! environment variables ([`Overrides`]), the optional YAML card document
//! ([`CardConfig`]), and built-in defaults. Only the CLI layer reads the process
//! environment.

use std::{collections::BTreeMap, fmt, fs, path::{Path, PathBuf}, time::Duration};

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    error::{self, Error},
    loc::EstimationConstants,
    retry::RetryConfig,
    svg::{CardLayout, StatField},
};

const DEFAULT_SVG_PATH: &str = "card.svg";
const DEFAULT_CACHE_PATH: &str = "cache/stats.json";
const DEFAULT_WORK_DIR_NAME: &str = "statcard-repos";
const DEFAULT_THROTTLE_MS: u64 = 100;
const DEFAULT_FRESHNESS_HOURS: u64 = 24;

/// Optional YAML document describing a card deployment.
///
/// # Examples
///
/// ```
/// use statcard::CardConfig;
///
/// let yaml = r#"
/// username: octocat
/// commit_source: per_repository
/// fields:
///   stars:
///     id: star_value
///     dots_width: 12
/// "#;
/// let config: CardConfig = serde_yaml::from_str(yaml,).expect("valid configuration",);
/// assert_eq!(config.username.as_deref(), Some("octocat"));
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize,)]
#[serde(deny_unknown_fields)]
pub struct CardConfig
{
    /// GitHub login whose statistics are rendered.
    #[serde(default, alias = "user")]
    pub username: Option<String,>,

    /// SVG template rewritten in place.
    #[serde(default)]
    pub svg_path: Option<PathBuf,>,

    /// JSON cache file location.
    #[serde(default)]
    pub cache_path: Option<PathBuf,>,

    /// Scratch directory for repository clones.
    #[serde(default)]
    pub work_dir: Option<PathBuf,>,

    /// Whether to keep a `.bak` copy of the template before rewriting it.
    #[serde(default)]
    pub backup: Option<bool,>,

    /// Where the commit figure comes from.
    #[serde(default)]
    pub commit_source: Option<CommitSource,>,

    /// How the lines-of-code figure is produced.
    #[serde(default)]
    pub loc_strategy: Option<LocStrategy,>,

    #[serde(default)]
    pub estimation: Option<EstimationConstants,>,

    #[serde(default)]
    pub retry: Option<RetryConfig,>,

    /// Pause between per-repository requests in milliseconds.
    #[serde(default)]
    pub throttle_ms: Option<u64,>,

    /// Age in hours after which cached statistics are recomputed.
    #[serde(default)]
    pub freshness_hours: Option<u64,>,

    /// Per-field element id and dot width overrides.
    #[serde(default)]
    pub fields: BTreeMap<StatField, FieldOverride,>,

    /// Values written when GitHub is unreachable and nothing is cached.
    #[serde(default)]
    pub fallback: Option<FallbackStats,>,

    /// Set to `false` to fail the run instead of writing fallback values.
    #[serde(default)]
    pub fallback_enabled: Option<bool,>,
}

/// Overrides for a single card slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize,)]
#[serde(deny_unknown_fields)]
pub struct FieldOverride
{
    /// Element id holding the value.
    #[serde(default)]
    pub id:         Option<String,>,
    /// Column width for dot justification; `0` disables the dots slot.
    #[serde(default)]
    pub dots_width: Option<usize,>,
}

/// Source of truth for the commit count of a deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize,)]
#[serde(rename_all = "snake_case")]
pub enum CommitSource
{
    /// `totalCommitContributions` from the contributions collection.
    #[default]
    Contributions,
    /// Sum of default-branch history lengths of owned repositories.
    PerRepository,
}

/// Strategy used to fill the lines-of-code slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize,)]
#[serde(rename_all = "snake_case")]
pub enum LocStrategy
{
    /// Commit count times a constant average.
    #[default]
    CommitEstimate,
    /// Repository size blended with the commit estimate.
    SizeBlend,
    /// Clone every owned repository and sum `git log --numstat`.
    GitHistory,
}

/// Statistics written when no live or cached record is available.
///
/// The defaults are all zero so a fallback card is recognizable at a glance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize,)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackStats
{
    pub repo_count:        u64,
    pub contributed_count: u64,
    pub star_total:        u64,
    pub follower_count:    u64,
    pub commit_count:      u64,
    pub loc_added:         u64,
    pub loc_deleted:       u64,
}

/// GitHub credential with a redacted debug representation.
#[derive(Clone, PartialEq, Eq,)]
pub struct Token(String,);

impl Token
{
    pub fn expose(&self,) -> &str
    {
        &self.0
    }
}

impl fmt::Debug for Token
{
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result
    {
        f.write_str("Token(***)",)
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default,)]
pub struct Overrides
{
    pub token:      Option<String,>,
    pub birth_date: Option<String,>,
    pub username:   Option<String,>,
    pub svg_path:   Option<PathBuf,>,
    pub cache_path: Option<PathBuf,>,
    pub no_backup:  bool,
}

/// Fully resolved configuration of one run.
#[derive(Debug, Clone,)]
pub struct Settings
{
    pub username:      String,
    pub token:         Option<Token,>,
    pub birth_date:    Option<NaiveDate,>,
    pub svg_path:      PathBuf,
    pub cache_path:    PathBuf,
    pub work_dir:      PathBuf,
    pub backup:        bool,
    pub commit_source: CommitSource,
    pub loc_strategy:  LocStrategy,
    pub estimation:    EstimationConstants,
    pub retry:         RetryConfig,
    pub throttle:      Duration,
    pub freshness:     Duration,
    pub layout:        CardLayout,
    pub fallback:      Option<FallbackStats,>,
}

impl Settings
{
    /// Merges the card document with command line overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no username is available, the birth
    /// date is malformed, or a numeric setting is out of range.
    pub fn resolve(card: CardConfig, overrides: Overrides,) -> Result<Self, Error,>
    {
        let username = overrides
            .username
            .or(card.username,)
            .map(|name| name.trim().to_owned(),)
            .filter(|name| !name.is_empty(),)
            .ok_or_else(|| {
                Error::config("a GitHub username is required (--user, STATCARD_USER or `username`)",)
            },)?;

        let token = overrides
            .token
            .map(|value| value.trim().to_owned(),)
            .filter(|value| !value.is_empty(),)
            .map(Token,);

        let birth_date = match overrides.birth_date.as_deref().map(str::trim,) {
            Some(raw,) if !raw.is_empty() => Some(parse_birth_date(raw,)?,),
            _ => None,
        };

        let estimation = card.estimation.unwrap_or_default();
        if estimation.size_weight_percent > 100 {
            return Err(Error::config(format!(
                "estimation.size_weight_percent must be at most 100, got {}",
                estimation.size_weight_percent
            ),),);
        }

        let retry = card.retry.unwrap_or_default();
        if retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1",),);
        }

        let freshness_hours = card.freshness_hours.unwrap_or(DEFAULT_FRESHNESS_HOURS,);
        let freshness = freshness_hours
            .checked_mul(60 * 60,)
            .map(Duration::from_secs,)
            .ok_or_else(|| {
                Error::config(format!("freshness_hours is out of range, got {freshness_hours}"),)
            },)?;

        let fallback = if card.fallback_enabled.unwrap_or(true,) {
            Some(card.fallback.unwrap_or_default(),)
        } else {
            None
        };

        Ok(Self {
            username,
            token,
            birth_date,
            svg_path: overrides
                .svg_path
                .or(card.svg_path,)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SVG_PATH,),),
            cache_path: overrides
                .cache_path
                .or(card.cache_path,)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH,),),
            work_dir: card
                .work_dir
                .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_WORK_DIR_NAME,),),
            backup: !overrides.no_backup && card.backup.unwrap_or(true,),
            commit_source: card.commit_source.unwrap_or_default(),
            loc_strategy: card.loc_strategy.unwrap_or_default(),
            estimation,
            retry,
            throttle: Duration::from_millis(card.throttle_ms.unwrap_or(DEFAULT_THROTTLE_MS,),),
            freshness,
            layout: CardLayout::default().with_overrides(&card.fields,),
            fallback,
        },)
    }

    /// Returns the credential or fails fast when it was not supplied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `GITHUB_TOKEN` is absent or empty.
    pub fn require_token(&self,) -> Result<&Token, Error,>
    {
        self.token
            .as_ref()
            .ok_or_else(|| Error::config("GITHUB_TOKEN must be set to query the GitHub API",),)
    }
}

/// Loads the YAML card document.
///
/// # Errors
///
/// Returns [`Error::Io`] when the file cannot be read and
/// [`Error::ConfigParse`] when it is not a valid card document.
pub fn load_card_config(path: &Path,) -> Result<CardConfig, Error,>
{
    let contents = fs::read_to_string(path,).map_err(|source| error::io_error(path, source,),)?;
    Ok(serde_yaml::from_str(&contents,)?,)
}

/// Parses a birth date given either as `YYYY-MM-DD` or an RFC 3339 instant.
///
/// # Errors
///
/// Returns [`Error::Config`] for any other format.
pub fn parse_birth_date(raw: &str,) -> Result<NaiveDate, Error,>
{
    if let Ok(date,) = NaiveDate::parse_from_str(raw, "%Y-%m-%d",) {
        return Ok(date,);
    }

    DateTime::parse_from_rfc3339(raw,).map(|instant| instant.date_naive(),).map_err(|e| {
        Error::config(format!("DOB_ISO must be an ISO-8601 date, got '{raw}': {e}"),)
    },)
}
