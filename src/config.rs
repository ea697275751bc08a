//! Configuration management.
//!
//! Resolution order: built-in defaults, then a config file (TOML, YAML or
//! JSON by extension), then environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fetch::{Backoff, RetryPolicy};
use crate::proxy::ProxyRotator;
use crate::record::DateWindow;
use crate::scheduler::Scheduler;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "socialpulse.db";

/// Config files are discovered as `socialpulse.{toml,yaml,yml,json}`.
pub const CONFIG_BASENAME: &str = "socialpulse";

const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Default proxy list filename inside the data directory.
const PROXIES_FILENAME: &str = "proxies.txt";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Supported search sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Youtube,
    /// Comment threads of a video; keys are video ids.
    #[serde(rename = "youtube_comments")]
    YoutubeComments,
    Mediacloud,
    Gnews,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Youtube => "youtube",
            SourceKind::YoutubeComments => "youtube_comments",
            SourceKind::Mediacloud => "mediacloud",
            SourceKind::Gnews => "gnews",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enrichment passes a job can request after ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichPass {
    /// Resolve redirect links into `decoded_url`.
    Decode,
    /// Extract full text into `content`.
    Extract,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    /// Set via YOUTUBE_API_KEY.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_url: String,
    pub page_size: u32,
    /// Threads per `commentThreads` page, at most 100.
    pub comments_page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_language: Option<String>,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            page_size: 50,
            comments_page_size: 100,
            region_code: None,
            relevance_language: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaCloudConfig {
    /// Set via MEDIA_CLOUD_API_KEY.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_url: String,
    pub platform: String,
    /// Media collections to search; empty searches everything.
    pub collection_ids: Vec<u64>,
}

impl Default for MediaCloudConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://search.mediacloud.org/api/search".to_string(),
            platform: "onlinenews-mediacloud".to_string(),
            collection_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GnewsConfig {
    pub base_url: String,
    pub language: String,
    pub country: String,
}

impl Default for GnewsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://news.google.com/rss/search".to_string(),
            language: "es-419".to_string(),
            country: "MX".to_string(),
        }
    }
}

/// Per-source adapter settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub youtube: YoutubeConfig,
    pub mediacloud: MediaCloudConfig,
    pub gnews: GnewsConfig,
}

fn default_chunk_days() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

/// One slice of the work space: a source searched for a list of keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub source: SourceKind,
    pub keys: Vec<String>,
    /// Each qualifier is prefixed to every key (e.g. a state name).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qualifiers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
    /// Width of each date chunk for chunked sources.
    #[serde(default = "default_chunk_days")]
    pub chunk_days: u32,
    /// Cap on records per key for token-paged sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enrich: Vec<EnrichPass>,
    /// Skip keys whose collection is already marked complete.
    #[serde(default = "default_true")]
    pub skip_complete: bool,
}

impl JobConfig {
    /// The search keys this job expands to.
    pub fn search_keys(&self) -> Vec<String> {
        let keys = self
            .keys
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty());
        if self.qualifiers.is_empty() {
            return keys.map(str::to_string).collect();
        }
        let keys: Vec<&str> = keys.collect();
        self.qualifiers
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .flat_map(|q| keys.iter().map(move |k| format!("{} {}", q, k)))
            .collect()
    }

    /// The job's date window, if it has one.
    pub fn window(&self) -> Result<Option<DateWindow>, ConfigError> {
        match (self.start, self.end) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => Ok(Some(DateWindow::new(start, end))),
            _ => Err(ConfigError::Invalid(format!(
                "job '{}' needs both start and end, or neither",
                self.name
            ))),
        }
    }
}

/// Retry overrides; unset fields keep the phase default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<Backoff>,
}

impl RetryConfig {
    fn apply(&self, base: RetryPolicy) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts.unwrap_or(base.max_attempts),
            self.delay_ms.map(Duration::from_millis).unwrap_or(base.delay),
            self.backoff.unwrap_or(base.backoff),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrich_workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrich_request_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxy list file, one endpoint per line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Endpoints appended after the file's entries.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub list: Vec<String>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename inside the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Retries for page and chunk fetches.
    #[serde(default)]
    pub fetch: RetryConfig,
    /// Retries for single-record enrichment.
    #[serde(default)]
    pub enrich: RetryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub proxies: ProxyConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jobs: Vec<JobConfig>,
    /// Path this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Look for `socialpulse.{toml,yaml,yml,json}` in each directory, in order.
    pub fn discover(dirs: &[PathBuf]) -> Option<PathBuf> {
        dirs.iter()
            .flat_map(|dir| {
                CONFIG_EXTENSIONS
                    .iter()
                    .map(move |ext| dir.join(format!("{}.{}", CONFIG_BASENAME, ext)))
            })
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration from a file; the format follows the extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let mut config = Self::parse(path, &contents)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        match ext {
            "toml" => toml::from_str(contents).map_err(|e| parse_error(e.to_string())),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| parse_error(e.to_string())),
            _ => serde_json::from_str(contents).map_err(|e| parse_error(e.to_string())),
        }
    }

    /// Directory relative paths in the file are resolved against.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Expand `~` and make relative paths relative to `base_dir`.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply file values on top of `settings`.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
            settings.proxies_file = settings.data_dir.join(PROXIES_FILENAME);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref url) = self.database_url {
            settings.database_url = Some(url.clone());
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }

        settings.page_retry = self.fetch.apply(settings.page_retry);
        settings.enrich_retry = self.enrich.apply(settings.enrich_retry);

        if let Some(workers) = self.scheduler.workers {
            settings.workers = workers;
        }
        if let Some(workers) = self.scheduler.enrich_workers {
            settings.enrich_workers = workers;
        }
        if let Some(delay) = self.scheduler.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(delay) = self.scheduler.enrich_request_delay_ms {
            settings.enrich_request_delay_ms = delay;
        }
        if let Some(attempts) = self.store.connect_attempts {
            settings.store_connect_attempts = attempts;
        }
        if let Some(delay) = self.store.connect_delay_ms {
            settings.store_connect_delay_ms = delay;
        }

        if let Some(ref file) = self.proxies.file {
            settings.proxies_file = self.resolve_path(file, base_dir);
        }
        settings.proxies.extend(self.proxies.list.iter().cloned());

        settings.sources = self.sources.clone();
        settings.jobs = self.jobs.clone();
    }
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub database_filename: String,
    /// Overrides `data_dir/database_filename` when set.
    pub database_url: Option<String>,
    /// `None` uses the crate default; `"browser"` (or `"impersonate"`) rotates browser agents.
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    pub page_retry: RetryPolicy,
    pub enrich_retry: RetryPolicy,
    pub workers: usize,
    pub enrich_workers: usize,
    /// Delay between unit submissions in milliseconds.
    pub request_delay_ms: u64,
    /// Delay between enrichment requests; 0 sends them back to back.
    pub enrich_request_delay_ms: u64,
    pub store_connect_attempts: u32,
    pub store_connect_delay_ms: u64,
    pub proxies_file: PathBuf,
    /// Inline endpoints appended to the proxy file's.
    pub proxies: Vec<String>,
    pub sources: SourcesConfig,
    pub jobs: Vec<JobConfig>,
    /// Config file the settings came from, if any.
    pub config_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        // Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("socialpulse");
        Self::with_data_dir(data_dir)
    }
}

impl Settings {
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            proxies_file: data_dir.join(PROXIES_FILENAME),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            user_agent: None,
            request_timeout: 30,
            page_retry: RetryPolicy::new(5, Duration::from_secs(1), Backoff::Fixed),
            enrich_retry: RetryPolicy::new(5, Duration::from_millis(100), Backoff::Fixed),
            workers: 5,
            enrich_workers: 20,
            request_delay_ms: 1000,
            enrich_request_delay_ms: 0,
            store_connect_attempts: 5,
            store_connect_delay_ms: 1000,
            proxies: Vec::new(),
            sources: SourcesConfig::default(),
            jobs: Vec::new(),
            config_path: None,
        }
    }

    /// Defaults, then the config file, then the environment.
    ///
    /// An explicit `config_path` must exist; otherwise the working directory
    /// and the default data directory are searched.
    pub async fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();

        let path = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let mut dirs = Vec::new();
                if let Ok(cwd) = std::env::current_dir() {
                    dirs.push(cwd);
                }
                dirs.push(settings.data_dir.clone());
                Config::discover(&dirs)
            }
        };

        if let Some(path) = path {
            let config = Config::load_from_path(&path).await?;
            let base_dir = config
                .base_dir()
                .or_else(|| std::env::current_dir().ok())
                .unwrap_or_else(|| PathBuf::from("."));
            config.apply_to_settings(&mut settings, &base_dir);
            info!("Loaded config from {}", path.display());
            settings.config_path = Some(path);
        } else {
            debug!("No config file found, using defaults");
        }

        settings.apply_env(|name| std::env::var(name).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(key) = get("YOUTUBE_API_KEY") {
            self.sources.youtube.api_key = Some(key);
        }
        if let Some(key) = get("MEDIA_CLOUD_API_KEY") {
            self.sources.mediacloud.api_key = Some(key);
        }
        if let Some(list) = get("PULSE_PROXIES") {
            self.proxies.extend(
                list.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            );
        }
    }

    /// Reject settings that cannot produce a sensible run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = std::collections::HashSet::new();
        for job in &self.jobs {
            if !names.insert(job.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate job name '{}'",
                    job.name
                )));
            }
            if job.search_keys().is_empty() {
                warn!("Job '{}' has no keys and will do nothing", job.name);
            }
            job.window()?;
        }
        Ok(())
    }

    /// Database URL, constructed from the data dir if not explicitly set.
    pub fn database_url(&self) -> String {
        match self.database_url {
            Some(ref url) => url.clone(),
            None => format!("sqlite:{}", self.database_path().display()),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn store_connect_delay(&self) -> Duration {
        Duration::from_millis(self.store_connect_delay_ms)
    }

    /// Scheduler for ingestion units.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.workers, Duration::from_millis(self.request_delay_ms))
    }

    /// Scheduler for per-record enrichment.
    pub fn enrich_scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.enrich_workers,
            Duration::from_millis(self.enrich_request_delay_ms),
        )
    }

    /// Proxy pool from the proxy file plus inline endpoints.
    pub fn proxy_rotator(&self) -> std::io::Result<ProxyRotator> {
        let rotator = ProxyRotator::load(&self.proxies_file)?;
        Ok(rotator.with_extra(&self.proxies))
    }

    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn job(keys: &[&str], qualifiers: &[&str]) -> JobConfig {
        JobConfig {
            name: "j".into(),
            source: SourceKind::Gnews,
            keys: keys.iter().map(|s| s.to_string()).collect(),
            qualifiers: qualifiers.iter().map(|s| s.to_string()).collect(),
            start: None,
            end: None,
            chunk_days: 10,
            limit: None,
            enrich: Vec::new(),
            skip_complete: true,
        }
    }

    #[test]
    fn qualifiers_prefix_every_key() {
        let keys = job(&["seguridad", "empleo"], &["Jalisco", "Sonora"]).search_keys();
        assert_eq!(
            keys,
            vec![
                "Jalisco seguridad",
                "Jalisco empleo",
                "Sonora seguridad",
                "Sonora empleo"
            ]
        );
        assert_eq!(job(&["a", " ", "b"], &[]).search_keys(), vec!["a", "b"]);
    }

    #[test]
    fn half_open_window_is_invalid() {
        let mut j = job(&["a"], &[]);
        j.start = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert!(j.window().is_err());
        j.end = NaiveDate::from_ymd_opt(2024, 2, 1);
        assert_eq!(j.window().unwrap().unwrap().days(), 31);
    }

    #[test]
    fn toml_config_applies_over_defaults() {
        let toml = r#"
data_dir = "/srv/pulse"
request_timeout = 10

[fetch]
max_attempts = 3
backoff = "exponential"

[scheduler]
workers = 8

[proxies]
list = ["10.0.0.1:3128"]

[sources.gnews]
country = "AR"

[[jobs]]
name = "states"
source = "gnews"
keys = ["Jalisco"]
start = "2024-01-01"
end = "2024-04-05"
enrich = ["decode", "extract"]
"#;
        let config = Config::parse(Path::new("socialpulse.toml"), toml).unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/"));

        assert_eq!(settings.data_dir, PathBuf::from("/srv/pulse"));
        assert_eq!(settings.proxies_file, PathBuf::from("/srv/pulse/proxies.txt"));
        assert_eq!(settings.request_timeout, 10);
        assert_eq!(settings.page_retry.max_attempts, 3);
        assert_eq!(settings.page_retry.backoff, Backoff::Exponential);
        assert_eq!(settings.page_retry.delay, Duration::from_secs(1));
        assert_eq!(settings.enrich_retry.delay, Duration::from_millis(100));
        assert_eq!(settings.workers, 8);
        assert_eq!(settings.proxies, vec!["10.0.0.1:3128"]);
        assert_eq!(settings.sources.gnews.country, "AR");
        assert_eq!(settings.sources.gnews.language, "es-419");

        let job = settings.job("states").unwrap();
        assert_eq!(job.chunk_days, 10);
        assert!(job.skip_complete);
        assert_eq!(job.enrich, vec![EnrichPass::Decode, EnrichPass::Extract]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn yaml_and_json_are_accepted() {
        let yaml = "jobs:\n  - name: yt\n    source: youtube\n    keys: [Sonora]\n    limit: 200\n";
        let config = Config::parse(Path::new("socialpulse.yaml"), yaml).unwrap();
        assert_eq!(config.jobs[0].source, SourceKind::Youtube);
        assert_eq!(config.jobs[0].limit, Some(200));

        let json = r#"{"scheduler": {"request_delay_ms": 5000}}"#;
        let config = Config::parse(Path::new("socialpulse.json"), json).unwrap();
        assert_eq!(config.scheduler.request_delay_ms, Some(5000));
    }

    #[test]
    fn enrich_delay_reaches_the_pipeline() {
        use crate::pipeline::Pipeline;
        use crate::proxy::ProxyRotator;
        use crate::store::MemoryStore;
        use std::sync::Arc;

        let defaults = Pipeline::from_settings(
            Arc::new(MemoryStore::new()),
            ProxyRotator::direct(),
            &Settings::default(),
        );
        assert_eq!(defaults.enrich_scheduler().request_delay(), Duration::ZERO);

        let toml = "[scheduler]\nenrich_workers = 5\nenrich_request_delay_ms = 250\n";
        let config = Config::parse(Path::new("socialpulse.toml"), toml).unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/"));

        let pipeline = Pipeline::from_settings(
            Arc::new(MemoryStore::new()),
            ProxyRotator::direct(),
            &settings,
        );
        assert_eq!(
            pipeline.enrich_scheduler().request_delay(),
            Duration::from_millis(250)
        );
        assert_eq!(pipeline.enrich_scheduler().workers(), 5);
        // Ingestion keeps its own delay.
        assert_eq!(
            pipeline.scheduler().request_delay(),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn malformed_file_reports_path() {
        let err = Config::parse(Path::new("bad.toml"), "jobs = 3").unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn environment_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("DATABASE_URL", "sqlite:/tmp/x.db"),
            ("YOUTUBE_API_KEY", "yt-key"),
            ("MEDIA_CLOUD_API_KEY", ""),
            ("PULSE_PROXIES", "1.1.1.1:80, socks5://2.2.2.2:1080"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::with_data_dir(PathBuf::from("/data"));
        settings.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(settings.database_url(), "sqlite:/tmp/x.db");
        assert_eq!(settings.sources.youtube.api_key.as_deref(), Some("yt-key"));
        assert!(settings.sources.mediacloud.api_key.is_none());
        assert_eq!(settings.proxies.len(), 2);
    }

    #[test]
    fn default_database_lives_in_data_dir() {
        let settings = Settings::with_data_dir(PathBuf::from("/data"));
        assert_eq!(settings.database_url(), "sqlite:/data/socialpulse.db");
    }

    #[test]
    fn duplicate_job_names_are_rejected() {
        let mut settings = Settings::with_data_dir(PathBuf::from("/data"));
        settings.jobs = vec![job(&["a"], &[]), job(&["b"], &[])];
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn discovers_config_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("socialpulse.yml");
        std::fs::write(&path, "request_timeout: 5\n").unwrap();

        let found = Config::discover(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(found, path);
        let config = Config::load_from_path(&found).await.unwrap();
        assert_eq!(config.request_timeout, Some(5));
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));
    }
}
