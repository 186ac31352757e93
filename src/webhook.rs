//! Webhook payload structures
//!
//! Only the fields the relay needs are modelled; everything else in the
//! payload is ignored. Missing and `null` fields fall back to their
//! defaults so that sparse payloads still decode.

use serde::{Deserialize, Deserializer};

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Repository description as sent by the VCS
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Project {
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub full_name: String,
}

/// One side of a pull request (we only read the base)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Branch {
    pub label: Option<String>,
    #[serde(rename = "ref", deserialize_with = "null_as_default")]
    pub ref_name: String,
    pub sha: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub repo: Project,
}

/// Lifecycle state of a pull request
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PullRequest {
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub state: PullRequestState,
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub base: Branch,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Fields shared by every hook. `hook_name` selects the agent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BasicHook {
    #[serde(default, deserialize_with = "null_as_default")]
    pub hook_name: String,
    pub hook_id: Option<i64>,
    pub hook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullRequestHook {
    #[serde(flatten)]
    pub basic: BasicHook,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pull_request: PullRequest,
}

/// Push and tag push hooks share one shape
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushTagHook {
    #[serde(flatten)]
    pub basic: BasicHook,
    #[serde(default, rename = "ref", deserialize_with = "null_as_default")]
    pub ref_name: String,
    #[serde(default, rename = "repository", deserialize_with = "null_as_default")]
    pub project: Project,
}
