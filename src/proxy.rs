//! Egress proxy rotation.
//!
//! A fixed pool of proxy endpoints handed out in a single global cyclic
//! order. The cursor is an atomic counter so concurrent workers never need a
//! lock and never see a torn advance.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

/// A proxy endpoint URL (`http://`, `https://`, `socks5://`, `socks5h://`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy(String);

impl Proxy {
    /// Normalize an endpoint, prefixing `http://` when no scheme is given.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        if line.contains("://") {
            Some(Self(line.to_string()))
        } else {
            Some(Self(format!("http://{}", line)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print credentials embedded in the endpoint.
        match url::Url::parse(&self.0) {
            Ok(u) if !u.username().is_empty() || u.password().is_some() => write!(
                f,
                "{}://***@{}:{}",
                u.scheme(),
                u.host_str().unwrap_or("?"),
                u.port_or_known_default().unwrap_or(0)
            ),
            _ => write!(f, "{}", self.0),
        }
    }
}

/// Ordered proxy pool with a synchronized cyclic cursor.
///
/// Cloning shares the cursor, so every clone continues the same cycle.
#[derive(Debug, Clone, Default)]
pub struct ProxyRotator {
    proxies: Arc<Vec<Proxy>>,
    cursor: Arc<AtomicUsize>,
}

impl ProxyRotator {
    pub fn new(proxies: Vec<Proxy>) -> Self {
        Self {
            proxies: Arc::new(proxies),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A rotator that always answers "no proxy".
    pub fn direct() -> Self {
        Self::default()
    }

    /// Parse a newline-separated proxy list.
    pub fn from_lines(contents: &str) -> Self {
        Self::new(contents.lines().filter_map(Proxy::parse).collect())
    }

    /// Load a proxy list file; a missing file yields an empty pool.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        if !path.exists() {
            debug!("No proxy list at {}, using direct connections", path.display());
            return Ok(Self::direct());
        }
        let contents = std::fs::read_to_string(path)?;
        let rotator = Self::from_lines(&contents);
        info!(
            "Loaded {} proxies from {}",
            rotator.len(),
            path.display()
        );
        Ok(rotator)
    }

    /// Append extra endpoints (from config or environment) to the pool.
    pub fn with_extra<I, S>(self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut proxies: Vec<Proxy> = self.proxies.as_ref().clone();
        proxies.extend(extra.into_iter().filter_map(|s| Proxy::parse(s.as_ref())));
        Self::new(proxies)
    }

    /// Next proxy in the global cycle, or `None` when the pool is empty.
    pub fn next(&self) -> Option<Proxy> {
        if self.proxies.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        Some(self.proxies[index].clone())
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_pool_returns_none() {
        let rotator = ProxyRotator::direct();
        assert_eq!(rotator.next(), None);
        assert_eq!(rotator.next(), None);
    }

    #[test]
    fn cycles_in_order() {
        let rotator = ProxyRotator::from_lines("10.0.0.1:8080\n\n10.0.0.2:8080\nsocks5://10.0.0.3:1080\n");
        let seen: Vec<String> = (0..6)
            .map(|_| rotator.next().unwrap().as_str().to_string())
            .collect();
        assert_eq!(
            seen,
            vec![
                "http://10.0.0.1:8080",
                "http://10.0.0.2:8080",
                "socks5://10.0.0.3:1080",
                "http://10.0.0.1:8080",
                "http://10.0.0.2:8080",
                "socks5://10.0.0.3:1080",
            ]
        );
    }

    #[test]
    fn clones_share_cursor() {
        let a = ProxyRotator::from_lines("p1:1\np2:2");
        let b = a.clone();
        assert_eq!(a.next().unwrap().as_str(), "http://p1:1");
        assert_eq!(b.next().unwrap().as_str(), "http://p2:2");
    }

    #[test]
    fn missing_file_is_direct() {
        let rotator = ProxyRotator::load(Path::new("/nonexistent/proxies.txt")).unwrap();
        assert!(rotator.is_empty());
    }

    #[test]
    fn display_redacts_credentials() {
        let proxy = Proxy::parse("user:secret@10.0.0.1:3128").unwrap();
        assert_eq!(proxy.to_string(), "http://***@10.0.0.1:3128");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_cycle() {
        let rotator = ProxyRotator::from_lines("a:1\nb:2\nc:3\nd:4");
        let mut handles = Vec::new();
        for _ in 0..8 {
            let rotator = rotator.clone();
            handles.push(tokio::spawn(async move {
                (0..100)
                    .map(|_| rotator.next().unwrap().as_str().to_string())
                    .collect::<Vec<_>>()
            }));
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for proxy in handle.await.unwrap() {
                *counts.entry(proxy).or_default() += 1;
            }
        }

        // 800 draws over a pool of 4 must be perfectly balanced.
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&c| c == 200));
    }
}
