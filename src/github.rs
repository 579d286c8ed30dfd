// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// GitHub data source used to build the stats card.
///
/// [`GitHubSource`] is the seam the pipeline depends on; [`GitHubClient`]
/// implements it over REST (profile, repository listing) and GraphQL
/// (contribution totals, per-repository history length).
use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::{config::Token, error::Error};

const PER_PAGE: usize = 100;

const CONTRIBUTIONS_QUERY: &str = r"
query($login: String!) {
  user(login: $login) {
    contributionsCollection {
      totalCommitContributions
      totalIssueContributions
      totalPullRequestContributions
      totalRepositoryContributions
    }
  }
}";

const COMMIT_COUNT_QUERY: &str = r"
query($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) {
    defaultBranchRef {
      target {
        ... on Commit {
          history {
            totalCount
          }
        }
      }
    }
  }
}";

/// Public profile fields used by the card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
pub struct UserProfile
{
    pub login:          String,
    pub follower_count: u64,
}

/// Repository as listed for a user, forks included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
pub struct Repository
{
    pub name:             String,
    /// `owner/name`.
    pub full_name:        String,
    pub is_fork:          bool,
    pub star_count:       u64,
    pub updated_at:       DateTime<Utc,>,
    pub size_kb:          u64,
    pub primary_language: Option<String,>,
}

impl Repository
{
    /// Splits `full_name` into owner and repository name.
    pub fn owner_and_name(&self,) -> (&str, &str,)
    {
        self.full_name.split_once('/',).unwrap_or(("", self.name.as_str(),),)
    }
}

/// Aggregate contribution counts reported for a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,)]
pub struct ContributionTotals
{
    #[serde(rename = "totalCommitContributions")]
    pub commit_contributions:       u64,
    #[serde(rename = "totalIssueContributions")]
    pub issue_contributions:        u64,
    #[serde(rename = "totalPullRequestContributions")]
    pub pull_request_contributions: u64,
    #[serde(rename = "totalRepositoryContributions")]
    pub repository_contributions:   u64,
}

/// Read-only view of GitHub consumed by the pipeline.
#[allow(async_fn_in_trait)]
pub trait GitHubSource
{
    /// Fetches the public profile of `username`.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthorized`] for a rejected credential, [`Error::NotFound`]
    /// for an unknown user, and transport errors as [`Error::Transient`].
    async fn user_profile(&self, username: &str,) -> Result<UserProfile, Error,>;

    /// Lists every repository of `username`, following pagination to the end.
    async fn list_repositories(&self, username: &str,) -> Result<Vec<Repository,>, Error,>;

    /// Fetches contribution totals with a single aggregate query.
    ///
    /// # Errors
    ///
    /// [`Error::RateLimited`] when GitHub reports quota exhaustion.
    async fn contribution_totals(&self, username: &str,) -> Result<ContributionTotals, Error,>;

    /// Number of commits on the default branch.
    ///
    /// # Errors
    ///
    /// Any request or GraphQL failure; the caller decides how to degrade.
    async fn repository_commit_count(&self, owner: &str, name: &str,) -> Result<u64, Error,>;
}

#[derive(Debug, Deserialize,)]
struct RestUser
{
    login:     String,
    #[serde(default)]
    followers: u64,
}

#[derive(Debug, Deserialize,)]
struct RestRepository
{
    name:             String,
    full_name:        String,
    #[serde(default)]
    fork:             bool,
    #[serde(default)]
    stargazers_count: u64,
    updated_at:       DateTime<Utc,>,
    #[serde(default)]
    size:             u64,
    #[serde(default)]
    language:         Option<String,>,
}

impl From<RestRepository,> for Repository
{
    fn from(raw: RestRepository,) -> Self
    {
        Self {
            name:             raw.name,
            full_name:        raw.full_name,
            is_fork:          raw.fork,
            star_count:       raw.stargazers_count,
            updated_at:       raw.updated_at,
            size_kb:          raw.size,
            primary_language: raw.language,
        }
    }
}

#[derive(Debug, Serialize,)]
struct PageParams
{
    per_page: usize,
    page:     u32,
}

/// octocrab-backed [`GitHubSource`].
#[derive(Clone,)]
pub struct GitHubClient
{
    octocrab: Octocrab,
}

impl GitHubClient
{
    /// Builds an authenticated client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the HTTP client cannot be constructed.
    pub fn new(token: &Token,) -> Result<Self, Error,>
    {
        let octocrab = Octocrab::builder().personal_token(token.expose(),).build().map_err(|e| {
            Error::config(format!("failed to initialize GitHub client: {e}"),)
        },)?;

        Ok(Self {
            octocrab,
        },)
    }

    async fn graphql(&self, query: &str, variables: Value,) -> Result<Value, Error,>
    {
        let payload = json!({ "query": query, "variables": variables });
        let response: Value = self.octocrab.graphql(&payload,).await?;

        match graphql_error(&response,) {
            Some(error,) => Err(error,),
            None => Ok(response,),
        }
    }
}

impl GitHubSource for GitHubClient
{
    async fn user_profile(&self, username: &str,) -> Result<UserProfile, Error,>
    {
        debug!("Fetching profile for {}", username);
        let user: RestUser = self.octocrab.get(format!("/users/{username}"), None::<&()>,).await?;

        Ok(UserProfile {
            login: user.login, follower_count: user.followers,
        },)
    }

    async fn list_repositories(&self, username: &str,) -> Result<Vec<Repository,>, Error,>
    {
        let mut repositories = Vec::with_capacity(PER_PAGE,);
        let mut page = 1u32;

        loop {
            debug!("Fetching repositories page {} for {}", page, username);
            let batch: Vec<RestRepository,> = self
                .octocrab
                .get(
                    format!("/users/{username}/repos"),
                    Some(&PageParams {
                        per_page: PER_PAGE, page,
                    },),
                )
                .await?;

            let received = batch.len();
            repositories.extend(batch.into_iter().map(Repository::from,),);

            if received < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(repositories,)
    }

    async fn contribution_totals(&self, username: &str,) -> Result<ContributionTotals, Error,>
    {
        debug!("Fetching contribution totals for {}", username);
        let response = self.graphql(CONTRIBUTIONS_QUERY, json!({ "login": username }),).await?;
        contributions_from_response(&response, username,)
    }

    async fn repository_commit_count(&self, owner: &str, name: &str,) -> Result<u64, Error,>
    {
        debug!("Fetching commit count for {}/{}", owner, name);
        let variables = json!({ "owner": owner, "name": name });
        let response = self.graphql(COMMIT_COUNT_QUERY, variables,).await?;
        Ok(commit_count_from_response(&response,),)
    }
}

/// Extracts the first GraphQL error, classified by its `type`.
fn graphql_error(response: &Value,) -> Option<Error,>
{
    let errors = response.get("errors",)?.as_array()?;
    let first = errors.first()?;
    let message = first.get("message",).and_then(Value::as_str,).unwrap_or("unknown error",);

    let error = match first.get("type",).and_then(Value::as_str,) {
        Some("RATE_LIMITED",) => Error::RateLimited {
            message: message.to_owned(),
        },
        Some("NOT_FOUND",) => Error::not_found(message.to_owned(),),
        _ => Error::service(format!("GraphQL reported errors: {message}"),),
    };
    Some(error,)
}

fn contributions_from_response(
    response: &Value,
    username: &str,
) -> Result<ContributionTotals, Error,>
{
    let collection = response
        .pointer("/data/user/contributionsCollection",)
        .filter(|value| !value.is_null(),)
        .ok_or_else(|| Error::not_found(format!("GitHub user '{username}'"),),)?;

    serde_json::from_value(collection.clone(),)
        .map_err(|e| Error::service(format!("unexpected contributions payload: {e}"),),)
}

fn commit_count_from_response(response: &Value,) -> u64
{
    response
        .pointer("/data/repository/defaultBranchRef/target/history/totalCount",)
        .and_then(Value::as_u64,)
        .unwrap_or(0,)
}
