use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::Url;
use reqwest::blocking::Client;
use serde_json::Value;

use crate::config::{SlurpConfig, expand_base};
use crate::error::SlurpError;

/// Read-only access to the forge. Implementations perform one network round trip per call.
pub trait ForgeSource {
    fn get_text(&mut self, url: &str) -> Result<String>;
    fn get_json(&mut self, url: &str) -> Result<Value>;
    fn request_count(&self) -> usize;
}

/// URLs of one project's wiki.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgeEndpoints {
    pub web_base: String,
    pub api_base: String,
    pub history_limit: usize,
}

impl ForgeEndpoints {
    pub fn for_project(config: &SlurpConfig, project: &str) -> Result<Self> {
        Ok(Self {
            web_base: expand_base(&config.web_base_template(), project)?,
            api_base: expand_base(&config.api_base_template(), project)?,
            history_limit: config.history_limit(),
        })
    }

    pub fn page_list_url(&self) -> String {
        self.api_base.clone()
    }

    pub fn history_url(&self, page: &str) -> String {
        format!("{}{page}/history?limit={}", self.web_base, self.history_limit)
    }

    /// Diff of `revision` against itself, which renders the full page text.
    pub fn diff_url(&self, page: &str, revision: u64) -> String {
        format!("{}{page}/diff?v2={revision}&v1={revision}", self.web_base)
    }
}

/// Page names of the wiki, in the order the REST endpoint lists them.
pub fn page_list<S: ForgeSource>(source: &mut S, endpoints: &ForgeEndpoints) -> Result<Vec<String>> {
    let url = endpoints.page_list_url();
    let payload = source.get_json(&url)?;
    let pages = payload
        .get("pages")
        .and_then(Value::as_array)
        .ok_or_else(|| SlurpError::parse(format!("page list at {url} has no `pages` array")))?;
    let mut names = Vec::with_capacity(pages.len());
    for page in pages {
        let name = page
            .as_str()
            .ok_or_else(|| SlurpError::parse(format!("non-string page name at {url}: {page}")))?;
        names.push(name.to_string());
    }
    Ok(names)
}

#[derive(Debug, Clone)]
pub struct ForgeClientConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_ms: u64,
}

impl ForgeClientConfig {
    pub fn from_config(config: &SlurpConfig) -> Self {
        Self {
            user_agent: config.user_agent(),
            timeout_ms: config.timeout_ms(),
            rate_limit_ms: config.rate_limit_ms(),
        }
    }
}

pub struct ForgeClient {
    client: Client,
    config: ForgeClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl ForgeClient {
    pub fn new(config: ForgeClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build forge HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    fn send(&mut self, url: &str) -> Result<reqwest::blocking::Response> {
        let parsed = Url::parse(url).map_err(|error| fetch_error(url, error))?;
        self.apply_rate_limit();
        let response = self
            .client
            .get(parsed)
            .send()
            .map_err(|error| fetch_error(url, error))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(url, format!("HTTP {status}")).into());
        }
        Ok(response)
    }

    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.config.rate_limit_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }
}

impl ForgeSource for ForgeClient {
    /// Body decoded with the charset the server declares (UTF-8 when it declares none).
    fn get_text(&mut self, url: &str) -> Result<String> {
        let response = self.send(url)?;
        response
            .text()
            .map_err(|error| fetch_error(url, error).into())
    }

    fn get_json(&mut self, url: &str) -> Result<Value> {
        let response = self.send(url)?;
        response
            .json::<Value>()
            .map_err(|error| fetch_error(url, error).into())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn fetch_error(url: &str, error: impl std::fmt::Display) -> SlurpError {
    SlurpError::Fetch {
        url: url.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{ForgeEndpoints, ForgeSource, page_list};
    use crate::config::SlurpConfig;
    use crate::error::SlurpError;

    struct JsonSource {
        payload: Value,
        requests: Vec<String>,
    }

    impl ForgeSource for JsonSource {
        fn get_text(&mut self, url: &str) -> anyhow::Result<String> {
            self.requests.push(url.to_string());
            Ok(self.payload.to_string())
        }

        fn get_json(&mut self, url: &str) -> anyhow::Result<Value> {
            self.requests.push(url.to_string());
            Ok(self.payload.clone())
        }

        fn request_count(&self) -> usize {
            self.requests.len()
        }
    }

    fn endpoints() -> ForgeEndpoints {
        ForgeEndpoints {
            web_base: "https://sourceforge.net/p/demo/wiki/".to_string(),
            api_base: "https://sourceforge.net/rest/p/demo/wiki/".to_string(),
            history_limit: 250,
        }
    }

    #[test]
    fn endpoints_follow_forge_url_layout() {
        let endpoints = endpoints();
        assert_eq!(
            endpoints.history_url("Home"),
            "https://sourceforge.net/p/demo/wiki/Home/history?limit=250"
        );
        assert_eq!(
            endpoints.diff_url("Home", 7),
            "https://sourceforge.net/p/demo/wiki/Home/diff?v2=7&v1=7"
        );
        assert_eq!(
            endpoints.page_list_url(),
            "https://sourceforge.net/rest/p/demo/wiki/"
        );
    }

    #[test]
    fn endpoints_expand_configured_templates() {
        let mut config = SlurpConfig::default();
        config.forge.web_base = Some("https://forge.example.org/p/{project}/wiki".to_string());
        config.forge.api_base = Some("https://forge.example.org/rest/{project}/wiki/".to_string());
        config.forge.history_limit = Some(50);
        let endpoints = ForgeEndpoints::for_project(&config, "demo").expect("endpoints");
        assert_eq!(endpoints.web_base, "https://forge.example.org/p/demo/wiki/");
        assert_eq!(endpoints.api_base, "https://forge.example.org/rest/demo/wiki/");
        assert_eq!(
            endpoints.history_url("Home"),
            "https://forge.example.org/p/demo/wiki/Home/history?limit=50"
        );
    }

    #[test]
    fn page_list_reads_pages_array_in_order() {
        let mut source = JsonSource {
            payload: json!({"pages": ["Home", "Install", "FAQ"], "count": 3}),
            requests: Vec::new(),
        };
        let pages = page_list(&mut source, &endpoints()).expect("page list");
        assert_eq!(pages, vec!["Home", "Install", "FAQ"]);
        assert_eq!(
            source.requests,
            vec!["https://sourceforge.net/rest/p/demo/wiki/".to_string()]
        );
    }

    #[test]
    fn page_list_without_pages_is_a_parse_error() {
        let mut source = JsonSource {
            payload: json!({"error": "not found"}),
            requests: Vec::new(),
        };
        let error = page_list(&mut source, &endpoints()).expect_err("must fail");
        assert!(matches!(
            error.downcast_ref::<SlurpError>(),
            Some(SlurpError::Parse(_))
        ));
    }

    #[test]
    fn page_list_rejects_non_string_names() {
        let mut source = JsonSource {
            payload: json!({"pages": ["Home", 42]}),
            requests: Vec::new(),
        };
        assert!(page_list(&mut source, &endpoints()).is_err());
    }
}
