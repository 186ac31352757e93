//! Build target table and lookup

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::agent::Environment;

/// One entry of the build target table, as written in configuration.
///
/// The first five fields select and name the build. The `jenkins_*`
/// connection fields are optional; they are only used when all four are
/// present, otherwise the relay's default server settings apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BuildTargetConfig {
    pub environment: String,
    pub vcs_project: String,
    pub branch: String,
    #[serde(rename = "jenkins_project")]
    pub build_project: String,
    #[serde(rename = "jenkins_token")]
    pub build_token: String,
    #[serde(rename = "jenkins_host")]
    pub host: Option<String>,
    #[serde(rename = "jenkins_url")]
    pub url_template: Option<String>,
    #[serde(rename = "jenkins_username")]
    pub username: Option<String>,
    #[serde(rename = "jenkins_user_api_token")]
    pub api_token: Option<String>,
}

impl BuildTargetConfig {
    fn matches(&self, environment: &str, project: &str, branch: &str) -> bool {
        self.environment == environment && self.vcs_project == project && self.branch == branch
    }
}

/// A build target resolved for one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildTarget {
    pub name: String,
    pub token: String,
    pub host: Option<String>,
    pub url_template: Option<String>,
    pub username: Option<String>,
    pub api_token: Option<String>,
}

/// Connection settings a target brings along instead of the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedicatedServer<'a> {
    pub host: &'a str,
    pub url_template: &'a str,
    pub username: &'a str,
    pub api_token: &'a str,
}

impl BuildTarget {
    /// A target without a name or token cannot be notified.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() || self.token.is_empty()
    }

    /// Returns the dedicated server only when all four fields are set and
    /// non-empty. A partial set is ignored entirely.
    pub fn dedicated_server(&self) -> Option<DedicatedServer<'_>> {
        fn non_empty(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|v| !v.is_empty())
        }

        Some(DedicatedServer {
            host: non_empty(&self.host)?,
            url_template: non_empty(&self.url_template)?,
            username: non_empty(&self.username)?,
            api_token: non_empty(&self.api_token)?,
        })
    }
}

impl From<&BuildTargetConfig> for BuildTarget {
    fn from(config: &BuildTargetConfig) -> Self {
        BuildTarget {
            name: config.build_project.clone(),
            token: config.build_token.clone(),
            host: config.host.clone(),
            url_template: config.url_template.clone(),
            username: config.username.clone(),
            api_token: config.api_token.clone(),
        }
    }
}

/// Immutable table of named build targets, loaded once at startup.
///
/// Lookup is by (environment, project, branch) and the first match wins.
/// Iteration order is unspecified, so at most one entry may exist per
/// tuple; [`TargetStore::ambiguous_keys`] reports violations.
#[derive(Debug, Clone, Default)]
pub struct TargetStore {
    entries: HashMap<String, BuildTargetConfig>,
}

impl TargetStore {
    pub fn new(entries: HashMap<String, BuildTargetConfig>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the build target for an event. Comparison is exact and case
    /// sensitive. Returns None if no entry matches.
    pub fn match_build_target(
        &self,
        environment: &str,
        project: &str,
        branch: &str,
    ) -> Option<BuildTarget> {
        self.entries
            .values()
            .find(|config| config.matches(environment, project, branch))
            .map(BuildTarget::from)
    }

    /// Groups of keys that share an (environment, project, branch) tuple.
    /// Keys within a group and the groups themselves are sorted.
    pub fn ambiguous_keys(&self) -> Vec<Vec<String>> {
        let mut groups: BTreeMap<(&str, &str, &str), Vec<String>> = BTreeMap::new();
        for (key, config) in &self.entries {
            groups
                .entry((
                    config.environment.as_str(),
                    config.vcs_project.as_str(),
                    config.branch.as_str(),
                ))
                .or_default()
                .push(key.clone());
        }

        groups
            .into_values()
            .filter(|keys| keys.len() > 1)
            .map(|mut keys| {
                keys.sort();
                keys
            })
            .collect()
    }

    /// Keys whose environment no event can ever classify into.
    pub fn unreachable_keys(&self) -> Vec<String> {
        let production = Environment::Production.as_str();
        let debug = Environment::Debug.as_str();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, config)| config.environment != production && config.environment != debug)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl From<HashMap<String, BuildTargetConfig>> for TargetStore {
    fn from(entries: HashMap<String, BuildTargetConfig>) -> Self {
        Self::new(entries)
    }
}
