use std::{path::PathBuf, time::Duration};

use clap::Args;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_PAGE_SIZE: u32 = 5;
pub const DEFAULT_TOKEN_FILE: &str = ".campus-market-token.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client settings; every flag can also come from the environment.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend base URL (the API lives under `/api`)
    #[arg(long, env = "MARKET_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Orders fetched per feed page
    #[arg(
        long,
        env = "MARKET_PAGE_SIZE",
        default_value_t = DEFAULT_PAGE_SIZE,
        value_parser = clap::value_parser!(u32).range(1..=100)
    )]
    pub page_size: u32,

    /// Where the bearer token is kept between runs
    #[arg(long, env = "MARKET_TOKEN_FILE", default_value = DEFAULT_TOKEN_FILE)]
    pub token_file: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, env = "MARKET_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

impl ClientConfig {
    /// Settings pointing at `base_url`, everything else defaulted.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        ClientConfig {
            api_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn api_prefix(&self) -> String {
        format!("{}/api", self.api_url.trim_end_matches('/'))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_url: DEFAULT_API_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            token_file: PathBuf::from(DEFAULT_TOKEN_FILE),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}
