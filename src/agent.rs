//! Webhook agents
//!
//! An agent wraps one payload shape and answers the questions the relay
//! asks of every event: may it trigger a build, and which branch, project
//! and environment does it belong to.

use std::fmt;

use tracing::debug;

use crate::error::Result;
use crate::webhook::{PullRequestHook, PullRequestState, PushTagHook};

pub const PULL_REQUEST_HOOK: &str = "merge_request_hooks";
pub const PUSH_HOOK: &str = "push_hooks";
pub const TAG_PUSH_HOOK: &str = "tag_push_hooks";

/// Branch and project reported by the default agent.
pub const UNKNOWN: &str = "unknown";

/// Deployment environment derived from a branch name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Debug,
    Unknown,
}

impl Environment {
    /// Classify a branch. Prefix match only, so `master7` and `release/x`
    /// are both production.
    pub fn from_branch(branch: &str) -> Self {
        if branch.starts_with("master") || branch.starts_with("release") {
            Environment::Production
        } else {
            Environment::Debug
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Debug => "debug",
            Environment::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An agent for one kind of hook. The payload is `None` until a successful
/// [`HookAgent::parse`].
#[derive(Debug, Clone)]
pub enum HookAgent {
    PullRequest(Option<PullRequestHook>),
    PushTag(Option<PushTagHook>),
    /// Recognizes nothing and never triggers.
    Default,
}

impl HookAgent {
    /// Pick the agent for a `hook_name` discriminator.
    pub fn for_hook_name(hook_name: &str) -> Self {
        match hook_name {
            PULL_REQUEST_HOOK => HookAgent::PullRequest(None),
            PUSH_HOOK | TAG_PUSH_HOOK => HookAgent::PushTag(None),
            _ => HookAgent::Default,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HookAgent::PullRequest(_) => "PullRequestHookAgent",
            HookAgent::PushTag(_) => "PushTagHookAgent",
            HookAgent::Default => "DefaultHookAgent",
        }
    }

    /// Decode `payload` into this agent's shape. On failure the agent is
    /// left unparsed.
    pub fn parse(&mut self, payload: &[u8]) -> Result<()> {
        match self {
            HookAgent::PullRequest(slot) => {
                *slot = None;
                let hook: PullRequestHook = serde_json::from_slice(payload)?;
                let pr = &hook.pull_request;
                debug!(
                    "PR: {} / {} / {} / {:?}",
                    pr.title.as_deref().unwrap_or(""),
                    pr.base.repo.name,
                    pr.base.ref_name,
                    pr.state
                );
                *slot = Some(hook);
            }
            HookAgent::PushTag(slot) => {
                *slot = None;
                let hook: PushTagHook = serde_json::from_slice(payload)?;
                debug!(
                    "TagPush: {} / {} / {}",
                    hook.ref_name, hook.project.name, hook.project.full_name
                );
                *slot = Some(hook);
            }
            HookAgent::Default => {}
        }
        Ok(())
    }

    pub fn is_parsed(&self) -> bool {
        match self {
            HookAgent::PullRequest(hook) => hook.is_some(),
            HookAgent::PushTag(hook) => hook.is_some(),
            HookAgent::Default => true,
        }
    }

    /// Only merged pull requests trigger a build. Pushes and tags never do.
    pub fn can_trigger_event(&self) -> bool {
        match self {
            HookAgent::PullRequest(Some(hook)) => {
                hook.pull_request.state == PullRequestState::Merged
            }
            _ => false,
        }
    }

    /// Merge base ref for pull requests, the raw ref for pushes and tags.
    pub fn hook_branch(&self) -> &str {
        match self {
            HookAgent::PullRequest(hook) => hook
                .as_ref()
                .map_or("", |h| h.pull_request.base.ref_name.as_str()),
            HookAgent::PushTag(hook) => hook.as_ref().map_or("", |h| h.ref_name.as_str()),
            HookAgent::Default => UNKNOWN,
        }
    }

    pub fn hook_project(&self) -> &str {
        match self {
            HookAgent::PullRequest(hook) => hook
                .as_ref()
                .map_or("", |h| h.pull_request.base.repo.name.as_str()),
            HookAgent::PushTag(hook) => hook.as_ref().map_or("", |h| h.project.name.as_str()),
            HookAgent::Default => UNKNOWN,
        }
    }

    pub fn environment(&self) -> Environment {
        match self {
            HookAgent::Default => Environment::Unknown,
            _ => Environment::from_branch(self.hook_branch()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::PullRequest;

    const PULL_REQUEST: &[u8] = include_bytes!("../samples/pull_request.json");
    const PUSH: &[u8] = include_bytes!("../samples/push.json");

    fn pull_request_agent(state: PullRequestState) -> HookAgent {
        HookAgent::PullRequest(Some(PullRequestHook {
            pull_request: PullRequest {
                state,
                ..Default::default()
            },
            ..Default::default()
        }))
    }

    #[test]
    fn branch_environment() {
        let cases = [
            ("master", Environment::Production),
            ("master7", Environment::Production),
            ("release", Environment::Production),
            ("release/version-3.0", Environment::Production),
            ("develop", Environment::Debug),
            ("develop7", Environment::Debug),
            ("", Environment::Debug),
            ("Master", Environment::Debug),
            ("refs/heads/master", Environment::Debug),
        ];
        for (branch, expected) in cases {
            assert_eq!(Environment::from_branch(branch), expected, "branch {branch:?}");
        }
    }

    #[test]
    fn environment_strings() {
        assert_eq!(Environment::Production.to_string(), "production");
        assert_eq!(Environment::Debug.as_str(), "debug");
        assert_eq!(Environment::Unknown.as_str(), "unknown");
    }

    #[test]
    fn factory_selects_agent() {
        assert!(matches!(
            HookAgent::for_hook_name("merge_request_hooks"),
            HookAgent::PullRequest(None)
        ));
        assert!(matches!(
            HookAgent::for_hook_name("push_hooks"),
            HookAgent::PushTag(None)
        ));
        assert!(matches!(
            HookAgent::for_hook_name("tag_push_hooks"),
            HookAgent::PushTag(None)
        ));
        assert!(matches!(HookAgent::for_hook_name(""), HookAgent::Default));
        assert!(matches!(
            HookAgent::for_hook_name("note_hooks"),
            HookAgent::Default
        ));
    }

    #[test]
    fn agent_names() {
        assert_eq!(HookAgent::PullRequest(None).name(), "PullRequestHookAgent");
        assert_eq!(HookAgent::PushTag(None).name(), "PushTagHookAgent");
        assert_eq!(HookAgent::Default.name(), "DefaultHookAgent");
    }

    #[test]
    fn pull_request_parse() {
        let mut agent = HookAgent::for_hook_name(PULL_REQUEST_HOOK);
        agent.parse(PULL_REQUEST).unwrap();
        assert!(agent.is_parsed());
        assert_eq!(agent.hook_project(), "mingdao");
        assert_eq!(agent.hook_branch(), "master");
        assert_eq!(agent.environment(), Environment::Production);
        assert!(agent.can_trigger_event());
    }

    #[test]
    fn pull_request_trigger_requires_merged() {
        assert!(!pull_request_agent(PullRequestState::Open).can_trigger_event());
        assert!(!pull_request_agent(PullRequestState::Closed).can_trigger_event());
        assert!(!pull_request_agent(PullRequestState::Other).can_trigger_event());
        assert!(pull_request_agent(PullRequestState::Merged).can_trigger_event());
    }

    #[test]
    fn unparsed_agents_report_empty() {
        for agent in [HookAgent::PullRequest(None), HookAgent::PushTag(None)] {
            assert!(!agent.is_parsed());
            assert_eq!(agent.hook_branch(), "");
            assert_eq!(agent.hook_project(), "");
            assert!(!agent.can_trigger_event());
        }
    }

    #[test]
    fn failed_parse_leaves_agent_unparsed() {
        let mut agent = HookAgent::for_hook_name(PULL_REQUEST_HOOK);
        agent.parse(PULL_REQUEST).unwrap();

        let err = agent.parse(b"{not json").unwrap_err();
        assert!(matches!(err, crate::error::RelayError::ParseFailure(_)));
        assert!(!agent.is_parsed());
        assert_eq!(agent.hook_branch(), "");
        assert_eq!(agent.hook_project(), "");
        assert!(!agent.can_trigger_event());
    }

    #[test]
    fn push_tag_parse_never_triggers() {
        let mut agent = HookAgent::for_hook_name(PUSH_HOOK);
        agent.parse(PUSH).unwrap();
        assert_eq!(agent.hook_branch(), "refs/heads/develop");
        assert_eq!(agent.hook_project(), "mingdao");
        assert_eq!(agent.environment(), Environment::Debug);
        assert!(!agent.can_trigger_event());
    }

    #[test]
    fn tag_ref_is_not_normalized() {
        let mut agent = HookAgent::for_hook_name(TAG_PUSH_HOOK);
        agent
            .parse(br#"{"hook_name":"tag_push_hooks","ref":"release-2.1","repository":{"name":"P"}}"#)
            .unwrap();
        assert_eq!(agent.hook_branch(), "release-2.1");
        assert_eq!(agent.environment(), Environment::Production);
        assert!(!agent.can_trigger_event());
    }

    #[test]
    fn default_agent_ignores_payload() {
        for payload in [PULL_REQUEST, PUSH, b"garbage".as_slice(), b"".as_slice()] {
            let mut agent = HookAgent::Default;
            agent.parse(payload).unwrap();
            assert_eq!(agent.hook_branch(), UNKNOWN);
            assert_eq!(agent.hook_project(), UNKNOWN);
            assert_eq!(agent.environment(), Environment::Unknown);
            assert!(!agent.can_trigger_event());
        }
    }
}
