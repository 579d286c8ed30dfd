//! Keeps a GitHub statistics card up to date.
//!
//! The library fetches a user's profile, repositories and contribution totals,
//! estimates or measures lines of code, computes an age string, and writes
//! the figures into text elements of an existing SVG template. Results are
//! cached in a JSON file; when GitHub is unavailable the cached or configured
//! fallback statistics are written instead so the card is never left blank.

mod age;
mod cache;
mod config;
mod diagnostics;
mod error;
mod github;
mod loc;
mod pipeline;
mod retry;
mod stats;
mod svg;

pub use age::{AGE_PLACEHOLDER, AgeSpan, human_age};
pub use cache::{Cache, CacheStore, RepoCacheEntry, repo_key};
pub use config::{
    CardConfig, CommitSource, FallbackStats, FieldOverride, LocStrategy, Overrides, Settings,
    Token, load_card_config, parse_birth_date,
};
pub use diagnostics::failure_summary;
pub use error::{Error, classify_status, io_error};
pub use github::{ContributionTotals, GitHubClient, GitHubSource, Repository, UserProfile};
pub use loc::{
    EstimationConstants, LinesOfCode, estimate_from_commits, estimate_from_size,
    language_multiplier, measure_history, parse_numstat,
};
pub use pipeline::{RunOptions, RunReport, StatsOrigin, collect_stats, run};
pub use retry::{RetryConfig, Retryable, retry_with_backoff};
pub use stats::{
    SourceSnapshot, StatsRecord, aggregate, commit_count, resolve_lines_of_code,
};
pub use svg::{
    CardLayout, FieldSlot, StatField, SvgDocument, UpdateReport, apply_stats, backup_path,
    dot_fill, format_thousands, update_card,
};
