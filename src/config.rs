use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::util::{parse_bool_flag, parse_name_list};

const ALLOW_CONCURRENT_TURNS_ENV: &str = "VEX_ALLOW_CONCURRENT_TURNS";
const GLOBAL_AUTO_APPROVE_ENV: &str = "VEX_GLOBAL_AUTO_APPROVE";
const AUTO_APPROVE_TOOLS_ENV: &str = "VEX_AUTO_APPROVE_TOOLS";
const POST_APPROVAL_TOOLS_ENV: &str = "VEX_POST_APPROVAL_TOOLS";

/// Host-level policy knobs for a chat session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Accept a new request while the previous response is still streaming.
    #[serde(default)]
    pub allow_concurrent_turns: bool,
    /// Approve every tool call without asking.
    #[serde(default)]
    pub global_auto_approve: bool,
    /// Tools approved without asking.
    #[serde(default)]
    pub auto_approve_tools: Vec<String>,
    /// Tools whose results are held back until the user approves sharing them.
    #[serde(default)]
    pub post_approval_tools: Vec<String>,
}

impl SessionConfig {
    pub fn load() -> Result<Self> {
        let allow_concurrent_turns = env_flag(ALLOW_CONCURRENT_TURNS_ENV)?.unwrap_or(false);
        let global_auto_approve = env_flag(GLOBAL_AUTO_APPROVE_ENV)?.unwrap_or(false);
        let auto_approve_tools = std::env::var(AUTO_APPROVE_TOOLS_ENV)
            .map(|v| parse_name_list(&v))
            .unwrap_or_default();
        let post_approval_tools = std::env::var(POST_APPROVAL_TOOLS_ENV)
            .map(|v| parse_name_list(&v))
            .unwrap_or_default();

        Ok(Self {
            allow_concurrent_turns,
            global_auto_approve,
            auto_approve_tools,
            post_approval_tools,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(name) = self
            .auto_approve_tools
            .iter()
            .chain(self.post_approval_tools.iter())
            .find(|name| name.chars().any(char::is_whitespace))
        {
            bail!("Invalid tool name '{name}': tool names cannot contain whitespace");
        }

        if let Some(name) = self
            .auto_approve_tools
            .iter()
            .find(|name| self.post_approval_tools.contains(name))
        {
            bail!(
                "Tool '{name}' is listed in both {AUTO_APPROVE_TOOLS_ENV} and {POST_APPROVAL_TOOLS_ENV}"
            );
        }

        Ok(())
    }
}

fn env_flag(key: &str) -> Result<Option<bool>> {
    match std::env::var(key) {
        Ok(raw) => match parse_bool_flag(raw.clone()) {
            Some(value) => Ok(Some(value)),
            None => bail!("Invalid {key} '{raw}': expected true/false"),
        },
        Err(_) => Ok(None),
    }
}
