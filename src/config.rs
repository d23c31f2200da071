use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/87.0.4280.88 Safari/537.36.";

/// Runtime settings handed to every component at construction.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pause between consecutive requests, and between transient retries.
    pub delay: Duration,
    /// Pause after the upstream reports flood control.
    pub flood_cooldown: Duration,
    /// Offset step of the JSON search endpoint.
    pub page_size: u64,
    /// Hard cap on exported profiles per run.
    pub max_results: u64,
    /// Items on a full page of the mobile listing.
    pub listing_page_size: usize,
    pub listing_max_pages: u32,
    /// `None` retries forever.
    pub max_retries: Option<u32>,
    pub http_timeout: Duration,
    pub session_file: PathBuf,
    pub geo_file: PathBuf,
    pub result_prefix: String,
    pub result_suffix: String,
    pub verbosity: Verbosity,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            delay: Duration::from_secs(5),
            flood_cooldown: Duration::from_secs(360),
            page_size: 10,
            max_results: 500,
            listing_page_size: 10,
            listing_max_pages: 49,
            max_retries: None,
            http_timeout: Duration::from_secs(30),
            session_file: PathBuf::from("session"),
            geo_file: PathBuf::from("geo_data.json"),
            result_prefix: "result".to_string(),
            result_suffix: "my.mail.ru.csv".to_string(),
            verbosity: Verbosity::Normal,
        }
    }
}

impl Config {
    pub fn with_delay_secs(mut self, secs: u64) -> Self {
        self.delay = Duration::from_secs(secs);
        self
    }

    /// `<prefix>-<query>-<suffix>`
    pub fn result_file(&self, query: &str) -> PathBuf {
        PathBuf::from(format!("{}-{}-{}", self.result_prefix, query, self.result_suffix))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Debug,
}

impl Verbosity {
    pub fn from_flags(debug: bool, quiet: bool) -> Self {
        // --quite wins when both are given, as the later override did before.
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }

    pub fn level(self) -> LevelFilter {
        match self {
            Verbosity::Quiet => LevelFilter::Warn,
            Verbosity::Normal => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
        }
    }
}

/// Upstream URLs and the response markers the client keys its decisions on.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub auth_url: String,
    pub auth_landing_page: String,
    pub auth_fail_page: String,
    /// Where a rejected login lands.
    pub auth_fail_url: String,
    /// Landing page of a live session when the auth URL is revisited.
    pub inbox_url: String,
    /// Landing page of an expired session.
    pub login_fail_url: String,
    pub ajax_url: String,
    pub listing_url: String,
    /// Present in the body of a flood control page.
    pub flood_marker: String,
    /// Payload returned by the search API when access is revoked.
    pub denied_payload: String,
    pub probe_query: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            auth_url: "https://auth.mail.ru/cgi-bin/auth".to_string(),
            auth_landing_page: "https://my.mail.ru/".to_string(),
            auth_fail_page: "https://my.mail.ru/cgi-bin/login?fail=1".to_string(),
            auth_fail_url: "https://my.mail.ru/?fail=1".to_string(),
            inbox_url: "https://e.mail.ru/messages/inbox/".to_string(),
            login_fail_url: "https://account.mail.ru/login?&fail=1".to_string(),
            ajax_url: "https://my.mail.ru/cgi-bin/my/ajax".to_string(),
            listing_url: "https://m.my.mail.ru/my/search_people".to_string(),
            flood_marker: "https://help.mail.ru/my/access/unban/".to_string(),
            denied_payload: "https://auth.mail.ru/sdc?fail=https%3A%2F%2Fmy.mail.ru%2Fcgi-bin%2Flogin%3Fnoredir%3D1&from=".to_string(),
            probe_query: "test query".to_string(),
        }
    }
}
