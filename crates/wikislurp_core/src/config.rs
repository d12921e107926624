use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "wikislurp/0.1";
pub const DEFAULT_WEB_BASE: &str = "https://sourceforge.net/p/{project}/wiki/";
pub const DEFAULT_API_BASE: &str = "https://sourceforge.net/rest/p/{project}/wiki/";
pub const DEFAULT_AUTHOR_DOMAIN: &str = "users.sourceforge.net";
pub const DEFAULT_HISTORY_LIMIT: usize = 250;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

const PROJECT_PLACEHOLDER: &str = "{project}";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SlurpConfig {
    #[serde(default)]
    pub forge: ForgeSection,
    #[serde(default)]
    pub replay: ReplaySection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ForgeSection {
    pub web_base: Option<String>,
    pub api_base: Option<String>,
    pub author_domain: Option<String>,
    pub user_agent: Option<String>,
    pub history_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ReplaySection {
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
}

impl SlurpConfig {
    /// Web base template: env WIKISLURP_WEB_BASE > config > DEFAULT_WEB_BASE.
    pub fn web_base_template(&self) -> String {
        env_or("WIKISLURP_WEB_BASE", self.forge.web_base.as_deref())
            .unwrap_or_else(|| DEFAULT_WEB_BASE.to_string())
    }

    /// REST base template: env WIKISLURP_API_BASE > config > DEFAULT_API_BASE.
    pub fn api_base_template(&self) -> String {
        env_or("WIKISLURP_API_BASE", self.forge.api_base.as_deref())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
    }

    pub fn author_domain(&self) -> String {
        env_or("WIKISLURP_AUTHOR_DOMAIN", self.forge.author_domain.as_deref())
            .unwrap_or_else(|| DEFAULT_AUTHOR_DOMAIN.to_string())
    }

    pub fn user_agent(&self) -> String {
        env_or("WIKISLURP_USER_AGENT", self.forge.user_agent.as_deref())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn history_limit(&self) -> usize {
        self.forge
            .history_limit
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
    }

    pub fn timeout_ms(&self) -> u64 {
        env_value_u64("WIKISLURP_HTTP_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)
    }

    pub fn rate_limit_ms(&self) -> u64 {
        env_value_u64("WIKISLURP_RATE_LIMIT_MS", 0)
    }

    /// Committer identity used for replayed commits, when both halves are configured.
    pub fn committer(&self) -> Option<(String, String)> {
        let name = self.replay.committer_name.as_deref()?.trim();
        let email = self.replay.committer_email.as_deref()?.trim();
        if name.is_empty() || email.is_empty() {
            return None;
        }
        Some((name.to_string(), email.to_string()))
    }
}

/// Load and parse a SlurpConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SlurpConfig> {
    if !config_path.exists() {
        return Ok(SlurpConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SlurpConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Substitute the project identifier into a base URL template and force a trailing slash.
pub fn expand_base(template: &str, project: &str) -> Result<String> {
    let project = project.trim();
    if project.is_empty() {
        bail!("project identifier cannot be empty");
    }
    if project.contains('/') {
        bail!("project identifier must not contain '/': {project}");
    }
    let expanded = template.trim().replace(PROJECT_PLACEHOLDER, project);
    if expanded.ends_with('/') {
        Ok(expanded)
    } else {
        Ok(format!("{expanded}/"))
    }
}

fn env_or(key: &str, configured: Option<&str>) -> Option<String> {
    if let Ok(value) = env::var(key) {
        let trimmed = value.trim().to_string();
        if !trimmed.is_empty() {
            return Some(trimmed);
        }
    }
    configured
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
