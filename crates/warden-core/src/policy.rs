//! Per-fire fork policy (§3.3): the knobs a routine or reminder attaches
//! to a background or interactive fork, shared by the scheduler, fork
//! state, and tool-loop crates.

use serde::{Deserialize, Serialize};

/// When a fork is allowed to push its narrative into the main session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMainSession {
    /// `report_updates` must be called or the Stop hook blocks.
    Always,
    /// Only required if the fork already pinged the owner.
    OnPing,
    /// Never required; reports are accepted if offered.
    Freely,
    /// Reports are discarded; the tool is refused.
    Blocked,
}

impl Default for UpdateMainSession {
    fn default() -> Self {
        UpdateMainSession::OnPing
    }
}

/// Mutually exclusive tool allow/deny list. Construction enforces that at
/// most one side is populated (§3.3: "allowed_tools XOR blocked_tools").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolFilter {
    #[default]
    Unrestricted,
    Allow(Vec<String>),
    Block(Vec<String>),
}

impl ToolFilter {
    pub fn new(allowed: Vec<String>, blocked: Vec<String>) -> Result<Self, &'static str> {
        match (allowed.is_empty(), blocked.is_empty()) {
            (true, true) => Ok(ToolFilter::Unrestricted),
            (false, true) => Ok(ToolFilter::Allow(allowed)),
            (true, false) => Ok(ToolFilter::Block(blocked)),
            (false, false) => Err("allowed_tools and blocked_tools are mutually exclusive"),
        }
    }

    /// Whether `tool_name` may be offered under this filter.
    pub fn permits(&self, tool_name: &str) -> bool {
        match self {
            ToolFilter::Unrestricted => true,
            ToolFilter::Allow(list) => list.iter().any(|pat| glob_match(pat, tool_name)),
            ToolFilter::Block(list) => !list.iter().any(|pat| glob_match(pat, tool_name)),
        }
    }
}

/// Minimal `*`-glob matcher sufficient for tool-name patterns like
/// `discord_*` or `ping_user`.
fn glob_match(pattern: &str, name: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == name,
        Some((prefix, suffix)) => {
            name.len() >= prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
        }
    }
}

/// Per-fire policy attached to a routine or reminder fork (§3.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForkPolicy {
    #[serde(default)]
    pub update_main_session: UpdateMainSession,
    /// If false, ping/embed tools are removed and any attempt refused.
    #[serde(default = "default_allow_ping")]
    pub allow_ping: bool,
    #[serde(default)]
    pub tool_filter: ToolFilter,
}

fn default_allow_ping() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_filter_rejects_both_lists_populated() {
        let err = ToolFilter::new(vec!["a".into()], vec!["b".into()]);
        assert!(err.is_err());
    }

    #[test]
    fn allow_list_permits_only_matching_patterns() {
        let filter = ToolFilter::new(vec!["discord_*".into()], vec![]).unwrap();
        assert!(filter.permits("discord_embed"));
        assert!(!filter.permits("ping_user"));
    }

    #[test]
    fn block_list_permits_everything_else() {
        let filter = ToolFilter::new(vec![], vec!["ping_user".into()]).unwrap();
        assert!(!filter.permits("ping_user"));
        assert!(filter.permits("discord_embed"));
    }

    #[test]
    fn unrestricted_permits_everything() {
        assert!(ToolFilter::Unrestricted.permits("anything"));
    }
}
