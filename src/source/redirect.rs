//! Redirect-link decoder.
//!
//! Aggregator links (Google News `/rss/articles/...`) point at an
//! interstitial rather than the publisher. HTTP redirects are followed
//! through the proxy; when the final page is still on the aggregator, the
//! publisher URL is read from the `data-n-au` attribute. Interstitials that
//! only carry a signature and timestamp are resolved by posting them to the
//! aggregator's batchexecute endpoint.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::Decoder;
use crate::fetch::FetchError;
use crate::http::HttpClient;
use crate::proxy::Proxy;

const AGGREGATOR_HOST: &str = "news.google.com";
const BATCHEXECUTE_URL: &str = "https://news.google.com/_/DotsSplashUi/data/batchexecute";

pub struct RedirectDecoder {
    http: HttpClient,
}

impl RedirectDecoder {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Decoder for RedirectDecoder {
    async fn decode_one(
        &self,
        locator: &str,
        proxy: Option<&Proxy>,
    ) -> Result<Option<String>, FetchError> {
        let url = Url::parse(locator)
            .map_err(|e| FetchError::terminal(format!("unparseable locator {}: {}", locator, e)))?;
        if !is_aggregator(&url) {
            // Already a publisher link.
            return Ok(Some(locator.to_string()));
        }

        let page = self.http.get_page(locator, &[], proxy).await?;
        if let Some(target) = resolve_target(&page.final_url, &page.body) {
            return Ok(Some(target));
        }

        let (Some(id), Some(params)) = (article_id(&url), decoding_params(&page.body)) else {
            return Ok(None);
        };
        debug!("{}: resolving through batchexecute", id);
        let response = self
            .http
            .post_form(BATCHEXECUTE_URL, batchexecute_request(&id, &params), proxy)
            .await?;
        Ok(parse_batchexecute(&response))
    }
}

/// Signature and timestamp the interstitial embeds for its own decode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodingParams {
    pub signature: String,
    pub timestamp: String,
}

/// The opaque article id: the segment after `/articles/` or `/read/`.
pub fn article_id(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [.., "articles" | "read", id] => Some((*id).to_string()),
        _ => None,
    }
}

/// Read `data-n-a-sg` and `data-n-a-ts` from the interstitial.
pub fn decoding_params(body: &str) -> Option<DecodingParams> {
    let document = Html::parse_document(body);
    let selector = Selector::parse("[data-n-a-sg][data-n-a-ts]").ok()?;
    let el = document.select(&selector).next()?;
    let signature = el.value().attr("data-n-a-sg")?.trim();
    let timestamp = el.value().attr("data-n-a-ts")?.trim();
    if signature.is_empty() || timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    Some(DecodingParams {
        signature: signature.to_string(),
        timestamp: timestamp.to_string(),
    })
}

/// Form body for the `Fbv4je` (garturlreq) call.
pub fn batchexecute_request(id: &str, params: &DecodingParams) -> String {
    let inner = format!(
        r#"["garturlreq",[["X","X",["X","X"],null,null,1,1,"US:en",null,1,null,null,null,null,null,0,1],"X","X",1,[1,1,1],1,1,null,0,0,null,0],{},{},{}]"#,
        Value::from(id),
        params.timestamp,
        Value::from(params.signature.as_str()),
    );
    let envelope = json!([[["Fbv4je", inner]]]);
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("f.req", &envelope.to_string())
        .finish()
}

/// Publisher URL from a batchexecute response.
///
/// The body is an anti-XSSI prefix, a blank line, then a JSON envelope whose
/// first entry holds the real answer as a JSON-encoded string.
pub fn parse_batchexecute(text: &str) -> Option<String> {
    let envelope: Value = serde_json::from_str(text.split("\n\n").nth(1)?.trim()).ok()?;
    let answer: Value = serde_json::from_str(envelope.get(0)?.get(2)?.as_str()?).ok()?;
    answer
        .get(1)?
        .as_str()
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
        .map(str::to_string)
}

fn is_aggregator(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|h| h.eq_ignore_ascii_case(AGGREGATOR_HOST))
}

/// Pick the publisher URL out of a fetched aggregator response.
pub fn resolve_target(final_url: &str, body: &str) -> Option<String> {
    if let Ok(url) = Url::parse(final_url) {
        if !is_aggregator(&url) {
            return Some(final_url.to_string());
        }
    }

    let document = Html::parse_document(body);
    let selector = Selector::parse("[data-n-au]").ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("data-n-au"))
        .map(str::trim)
        .find(|href| href.starts_with("http://") || href.starts_with("https://"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirected_response_uses_final_url() {
        assert_eq!(
            resolve_target("https://www.informador.mx/nota-123.html", ""),
            Some("https://www.informador.mx/nota-123.html".to_string())
        );
    }

    #[test]
    fn interstitial_page_yields_data_attribute() {
        let body = r#"<html><body><c-wiz><div jscontroller="x" data-n-au="https://www.eluniversal.com.mx/estados/nota" data-n-a-sg="sig"></div></c-wiz></body></html>"#;
        assert_eq!(
            resolve_target("https://news.google.com/rss/articles/CBMiAAA", body),
            Some("https://www.eluniversal.com.mx/estados/nota".to_string())
        );
    }

    #[test]
    fn interstitial_without_target_is_none() {
        let body = "<html><body><p>consent</p></body></html>";
        assert_eq!(
            resolve_target("https://news.google.com/rss/articles/CBMiAAA", body),
            None
        );
    }

    const SIGNED_INTERSTITIAL: &str = r#"<html><body><c-wiz><div jscontroller="aLI87" data-n-a-id="CBMiAAA" data-n-a-sg="AZ5r3eR_sig" data-n-a-ts="1709539200"></div></c-wiz></body></html>"#;

    #[test]
    fn signed_interstitial_has_no_direct_target() {
        assert_eq!(
            resolve_target("https://news.google.com/rss/articles/CBMiAAA", SIGNED_INTERSTITIAL),
            None
        );
        assert_eq!(
            decoding_params(SIGNED_INTERSTITIAL),
            Some(DecodingParams {
                signature: "AZ5r3eR_sig".to_string(),
                timestamp: "1709539200".to_string(),
            })
        );
    }

    #[test]
    fn non_numeric_timestamp_is_rejected() {
        let body = r#"<div data-n-a-sg="sig" data-n-a-ts="soon"></div>"#;
        assert_eq!(decoding_params(body), None);
        assert_eq!(decoding_params("<p>consent</p>"), None);
    }

    #[test]
    fn article_id_from_rss_and_read_paths() {
        let id = |s: &str| article_id(&Url::parse(s).unwrap());
        assert_eq!(
            id("https://news.google.com/rss/articles/CBMiAAA?oc=5").as_deref(),
            Some("CBMiAAA")
        );
        assert_eq!(id("https://news.google.com/read/CBMiBBB").as_deref(), Some("CBMiBBB"));
        assert_eq!(id("https://news.google.com/topics/CAAq"), None);
    }

    #[test]
    fn batchexecute_request_is_form_encoded_envelope() {
        let params = decoding_params(SIGNED_INTERSTITIAL).unwrap();
        let body = batchexecute_request("CBMiAAA", &params);
        assert!(body.starts_with("f.req="));

        let decoded: Vec<(String, String)> = url::form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect();
        let envelope: Value = serde_json::from_str(&decoded[0].1).unwrap();
        assert_eq!(envelope[0][0][0], "Fbv4je");
        let inner: Value = serde_json::from_str(envelope[0][0][1].as_str().unwrap()).unwrap();
        assert_eq!(inner[0], "garturlreq");
        assert_eq!(inner[2], "CBMiAAA");
        assert_eq!(inner[3], 1709539200);
        assert_eq!(inner[4], "AZ5r3eR_sig");
    }

    #[test]
    fn batchexecute_response_yields_publisher_url() {
        let response = concat!(
            ")]}'\n\n",
            r#"[["wrb.fr","Fbv4je","[\"garturlres\",\"https://www.eluniversal.com.mx/estados/nota\",1]",null,null,null,"generic"],["di",42],["af.httprm",41,"-1",7]]"#
        );
        assert_eq!(
            parse_batchexecute(response).as_deref(),
            Some("https://www.eluniversal.com.mx/estados/nota")
        );
    }

    #[test]
    fn malformed_batchexecute_response_is_none() {
        assert_eq!(parse_batchexecute(")]}'\n\n[]"), None);
        assert_eq!(parse_batchexecute("<html>error</html>"), None);
        let not_a_url = concat!(
            ")]}'\n\n",
            r#"[["wrb.fr","Fbv4je","[\"garturlres\",\"CBMiAAA\",1]"]]"#
        );
        assert_eq!(parse_batchexecute(not_a_url), None);
    }

    #[tokio::test]
    async fn publisher_links_pass_through() {
        let http = HttpClient::new(crate::http::DEFAULT_TIMEOUT, None).unwrap();
        let decoder = RedirectDecoder::new(http);
        let decoded = decoder
            .decode_one("https://www.milenio.com/politica/nota", None)
            .await
            .unwrap();
        assert_eq!(decoded.as_deref(), Some("https://www.milenio.com/politica/nota"));
    }

    #[tokio::test]
    async fn malformed_locator_is_terminal() {
        let http = HttpClient::new(crate::http::DEFAULT_TIMEOUT, None).unwrap();
        let decoder = RedirectDecoder::new(http);
        let err = decoder.decode_one("not a url", None).await.unwrap_err();
        assert!(matches!(err, FetchError::Terminal(_)));
    }
}
