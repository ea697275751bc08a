//! The `User-Agent` each outbound client presents.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Sent when no agent is configured.
pub const DEFAULT_AGENT: &str = "socialpulse/0.3 (media monitoring research)";

/// Desktop browsers cycled through in `browser` mode.
const BROWSER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

/// Agent policy parsed from the `user_agent` setting.
///
/// `browser` (or the older `impersonate`) hands each new client the next
/// browser string, so traffic through different proxies does not share one
/// fingerprint.
#[derive(Debug, Clone)]
pub enum UserAgent {
    Default,
    Browser(Arc<AtomicUsize>),
    Custom(String),
}

impl UserAgent {
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("default") => UserAgent::Default,
            Some("browser") | Some("impersonate") => {
                UserAgent::Browser(Arc::new(AtomicUsize::new(0)))
            }
            Some(custom) => UserAgent::Custom(custom.to_string()),
        }
    }

    /// Agent string for the next client built.
    pub fn next(&self) -> &str {
        match self {
            UserAgent::Default => DEFAULT_AGENT,
            UserAgent::Browser(turn) => {
                BROWSER_AGENTS[turn.fetch_add(1, Ordering::Relaxed) % BROWSER_AGENTS.len()]
            }
            UserAgent::Custom(agent) => agent,
        }
    }
}
