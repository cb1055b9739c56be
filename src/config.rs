use crate::model::DEFAULT_LIMIT;
use std::path::PathBuf;

pub const DEFAULT_DATA_PATH: &str = "data/items.json";
pub const DEFAULT_BIND: &str = "127.0.0.1:3001";
pub const DEFAULT_API_URL: &str = "http://localhost:3001";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub data_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub page_limit: u32,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bind: non_empty(lookup("CATALOG_BIND")).unwrap_or_else(|| DEFAULT_BIND.to_string()),
            data_path: data_path(&lookup),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_url = non_empty(lookup("CATALOG_API_URL"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            page_limit: lookup("CATALOG_PAGE_LIMIT")
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|v| *v >= 1)
                .unwrap_or(DEFAULT_LIMIT),
        }
    }
}

pub fn data_path_from_env() -> PathBuf {
    data_path(&env_lookup)
}

fn data_path(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    non_empty(lookup("CATALOG_DATA_PATH"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH))
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
