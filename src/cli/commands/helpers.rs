//! Shared helper functions for CLI commands.

use std::sync::Arc;

use console::style;

use crate::config::Settings;
use crate::http::HttpClient;
use crate::pipeline::Pipeline;
use crate::store::{connect_store, RecordStore};

/// Open the store with the configured reconnect budget.
pub async fn open_store(settings: &Settings) -> Arc<dyn RecordStore> {
    connect_store(
        &settings.database_url(),
        settings.store_connect_attempts,
        settings.store_connect_delay(),
    )
    .await
}

/// HTTP client honouring the configured timeout and user agent.
pub fn http_client(settings: &Settings) -> anyhow::Result<HttpClient> {
    Ok(HttpClient::new(
        settings.request_timeout(),
        settings.user_agent.as_deref(),
    )?)
}

/// Store, proxies and schedulers wired from settings.
pub async fn build_pipeline(settings: &Settings) -> anyhow::Result<Pipeline> {
    let store = open_store(settings).await;
    let proxies = settings.proxy_rotator()?;
    if proxies.is_empty() {
        println!(
            "{} No proxies configured, requests go out directly",
            style("!").yellow()
        );
    }
    Ok(Pipeline::from_settings(store, proxies, settings))
}

/// Truncate a string for display, respecting char boundaries.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

/// Format a number with thousand separators.
pub fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
