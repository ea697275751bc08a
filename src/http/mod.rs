//! HTTP client shared by every source adapter.
//!
//! Wraps reqwest with per-proxy clients and maps transport and status
//! failures onto [`FetchError`] so the retry layer can tell what to retry.

mod user_agent;

use user_agent::UserAgent;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::fetch::{parse_retry_after, FetchError};
use crate::proxy::Proxy;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

/// A fetched body together with the URL it was finally served from.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub body: String,
}

/// reqwest client factory keyed by egress proxy.
#[derive(Clone)]
pub struct HttpClient {
    user_agent: UserAgent,
    timeout: Duration,
    direct: Client,
    proxied: Arc<Mutex<HashMap<String, Client>>>,
}

impl HttpClient {
    pub fn new(timeout: Duration, user_agent_config: Option<&str>) -> Result<Self, FetchError> {
        let user_agent = UserAgent::from_config(user_agent_config);
        let direct = build_client(user_agent.next(), timeout, None)?;
        Ok(Self {
            user_agent,
            timeout,
            direct,
            proxied: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Client routed through `proxy`, or the direct client.
    fn client_for(&self, proxy: Option<&Proxy>) -> Result<Client, FetchError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut cache = self
            .proxied
            .lock()
            .map_err(|_| FetchError::terminal("proxy client cache poisoned"))?;
        if let Some(client) = cache.get(proxy.as_str()) {
            return Ok(client.clone());
        }
        let client = build_client(self.user_agent.next(), self.timeout, Some(proxy))?;
        cache.insert(proxy.as_str().to_string(), client.clone());
        Ok(client)
    }

    /// GET a URL and decode the body as JSON.
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        proxy: Option<&Proxy>,
    ) -> Result<Value, FetchError> {
        let response = self.send(url, query, None, proxy).await?;
        decode_json(url, response).await
    }

    /// GET a URL with an `Authorization` header and decode the body as JSON.
    pub async fn get_json_authorized(
        &self,
        url: &str,
        query: &[(&str, String)],
        authorization: &str,
        proxy: Option<&Proxy>,
    ) -> Result<Value, FetchError> {
        let response = self.send(url, query, Some(authorization), proxy).await?;
        decode_json(url, response).await
    }

    /// GET a URL and return the body text.
    pub async fn get_text(
        &self,
        url: &str,
        query: &[(&str, String)],
        proxy: Option<&Proxy>,
    ) -> Result<String, FetchError> {
        Ok(self.get_page(url, query, proxy).await?.body)
    }

    /// GET a URL following redirects; reports the final URL too.
    pub async fn get_page(
        &self,
        url: &str,
        query: &[(&str, String)],
        proxy: Option<&Proxy>,
    ) -> Result<FetchedPage, FetchError> {
        let response = self.send(url, query, None, proxy).await?;
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(classify_error)?;
        Ok(FetchedPage { final_url, body })
    }

    /// POST an already-encoded form body and return the response text.
    pub async fn post_form(
        &self,
        url: &str,
        body: String,
        proxy: Option<&Proxy>,
    ) -> Result<String, FetchError> {
        let request = self
            .client_for(proxy)?
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body);

        debug!("POST {} via {}", url, via(proxy));
        let response = dispatch(request, url).await?;
        response.text().await.map_err(classify_error)
    }

    async fn send(
        &self,
        url: &str,
        query: &[(&str, String)],
        authorization: Option<&str>,
        proxy: Option<&Proxy>,
    ) -> Result<Response, FetchError> {
        let client = self.client_for(proxy)?;
        let mut request = client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(auth) = authorization {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        debug!("GET {} via {}", url, via(proxy));
        dispatch(request, url).await
    }
}

fn via(proxy: Option<&Proxy>) -> String {
    proxy.map_or_else(|| "direct".to_string(), |p| p.to_string())
}

/// Send a request and turn a non-success status into a [`FetchError`].
async fn dispatch(request: RequestBuilder, url: &str) -> Result<Response, FetchError> {
    let response = request.send().await.map_err(classify_error)?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = parse_retry_after(
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
    );
    Err(classify_status(status, retry_after, url))
}

async fn decode_json(url: &str, response: Response) -> Result<Value, FetchError> {
    response
        .json::<Value>()
        .await
        .map_err(|e| FetchError::terminal(format!("invalid JSON from {}: {}", url, e)))
}

fn build_client(
    user_agent: &str,
    timeout: Duration,
    proxy: Option<&Proxy>,
) -> Result<Client, FetchError> {
    let mut builder = Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .gzip(true)
        .brotli(true);
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy.as_str())
            .map_err(|e| FetchError::terminal(format!("invalid proxy {}: {}", proxy, e)))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| FetchError::terminal(format!("failed to build HTTP client: {}", e)))
}

/// Map a non-success status to a retryable or terminal error.
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, url: &str) -> FetchError {
    let reason = format!("HTTP {} from {}", status.as_u16(), url);
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        FetchError::Transient {
            reason,
            retry_after,
        }
    } else {
        FetchError::Terminal(reason)
    }
}

/// Map a transport error: timeouts and connection failures are retryable.
pub fn classify_error(e: reqwest::Error) -> FetchError {
    if e.is_builder() || e.is_decode() || e.is_redirect() {
        FetchError::terminal(e.to_string())
    } else {
        FetchError::transient(e.to_string())
    }
}
