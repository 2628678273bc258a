use std::{path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::backoff::RetryPolicy;
use crate::client::ClientConfig;

const BASE_URL_VARS: &[&str] = &["VERIOPS_API_BASE_URL", "VITE_API_BASE_URL", "NEXT_PUBLIC_API_BASE_URL"];
const API_KEY_VARS: &[&str] = &["VERIOPS_API_KEY", "VITE_VERIOPS_API_KEY", "NEXT_PUBLIC_VERIOPS_API_KEY"];
const HEALTH_KEY_VARS: &[&str] = &[
    "VERIOPS_HEALTH_INCLUDE_API_KEY",
    "VITE_HEALTH_INCLUDE_API_KEY",
    "NEXT_PUBLIC_HEALTH_INCLUDE_API_KEY",
];

/// Optional YAML config file. Every key can also come from the environment,
/// which wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCfg {
    pub api_base_url: Option<String>,
    pub api_key: Option<String>,
    pub health_include_api_key: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub retry: Option<RetryPolicy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_base_url: Option<String>,
    pub api_key: Option<String>,
    pub health_include_api_key: bool,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

pub async fn load_file(path: &Path) -> Result<FileCfg> {
    let txt = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&txt).context("Failed to parse config YAML")
}

fn flag(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}

impl Settings {
    /// Merges the config file with variables looked up through `env`.
    pub fn resolve(file: FileCfg, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| env(*n).filter(|v| !v.trim().is_empty()))
        };

        let timeout_secs = match env("VERIOPS_TIMEOUT_SECS") {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("VERIOPS_TIMEOUT_SECS is not a number: {v}"))?,
            None => file.timeout_secs.unwrap_or(30),
        };
        let mut retry = file.retry.unwrap_or_default();
        if let Some(v) = env("VERIOPS_MAX_RETRIES") {
            retry.max_retries = v
                .trim()
                .parse()
                .with_context(|| format!("VERIOPS_MAX_RETRIES is not a number: {v}"))?;
        }

        Ok(Self {
            api_base_url: first(BASE_URL_VARS).or(file.api_base_url),
            api_key: first(API_KEY_VARS).or(file.api_key),
            health_include_api_key: first(HEALTH_KEY_VARS)
                .map(|v| flag(&v))
                .or(file.health_include_api_key)
                .unwrap_or(false),
            timeout_secs,
            retry,
        })
    }

    /// Reads `.env`, the optional config file and the process environment.
    pub async fn load(config_path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        let file = match config_path {
            Some(p) => load_file(p).await?,
            None => FileCfg::default(),
        };
        Self::resolve(file, |name| std::env::var(name).ok())
    }

    pub fn client_config(&self) -> Result<ClientConfig> {
        let Some(raw) = self.api_base_url.as_deref() else {
            bail!("API base URL is not set; define VERIOPS_API_BASE_URL or api_base_url in the config file");
        };
        let base_url = Url::parse(raw).with_context(|| format!("invalid API base URL: {raw}"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!("API base URL must be http(s): {raw}");
        }
        Ok(ClientConfig {
            base_url,
            api_key: self.api_key.clone(),
            health_include_api_key: self.health_include_api_key,
            timeout: Duration::from_secs(self.timeout_secs),
            retry: self.retry.clone(),
        })
    }
}
