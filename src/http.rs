//! Static HTTP retrieval.
//!
//! A thin reqwest wrapper: realistic user agent, optional proxy, bounded
//! timeout, and charset-aware decoding of the body. Non-2xx answers are
//! reported as [`Error::HttpStatus`]; there are no retries, the fetcher
//! escalates to the browser instead.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::encoding;
use crate::error::{Error, Result};
use crate::proxy::ClientProxy;

/// A successful response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Requested URL.
    pub url: String,
    /// URL after redirects.
    pub final_url: String,
    /// Status code (always 2xx).
    pub status: u16,
    /// `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Body decoded to UTF-8.
    pub body: String,
}

/// HTTP client bound to one user agent and proxy setting.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Build a client. `proxy: None` ignores any environment proxy.
    pub fn new(user_agent: &str, proxy: Option<&ClientProxy>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10));

        match proxy {
            None => builder = builder.no_proxy(),
            Some(proxy) => {
                let no_proxy = proxy.no_proxy.as_deref().and_then(reqwest::NoProxy::from_string);
                if let Some(http) = &proxy.http {
                    let p = reqwest::Proxy::http(http)
                        .map_err(|e| Error::Configuration(format!("invalid proxy {http}: {e}")))?
                        .no_proxy(no_proxy.clone());
                    builder = builder.proxy(p);
                }
                if let Some(https) = &proxy.https {
                    let p = reqwest::Proxy::https(https)
                        .map_err(|e| Error::Configuration(format!("invalid proxy {https}: {e}")))?
                        .no_proxy(no_proxy);
                    builder = builder.proxy(p);
                }
            }
        }

        let client = builder
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// GET `url` within `timeout`.
    pub async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        debug!("GET {url}");
        let network = |e: reqwest::Error| Error::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(network)?;
        let body = encoding::decode_html(&bytes, content_type.as_deref());

        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }

    /// GET `url` and parse the body as JSON.
    pub async fn get_json(&self, url: &str, timeout: Duration) -> Result<serde_json::Value> {
        let response = self.get(url, timeout).await?;
        Ok(serde_json::from_str(&response.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new("rs-surf-test", None).expect("client")
    }

    #[tokio::test]
    async fn test_get_decodes_header_charset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latin1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=ISO-8859-1")
                    .set_body_bytes(b"<p>Caf\xE9</p>".to_vec()),
            )
            .mount(&server)
            .await;

        let url = format!("{}/latin1", server.uri());
        let response = client().get(&url, Duration::from_secs(5)).await.expect("get");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "<p>Café</p>");
    }

    #[tokio::test]
    async fn test_non_success_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client()
            .get(&server.uri(), Duration::from_secs(5))
            .await
            .expect_err("403 rejected");
        assert!(matches!(err, Error::HttpStatus { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_connection_failure_is_network_error() {
        let err = client()
            .get("http://127.0.0.1:1/", Duration::from_secs(2))
            .await
            .expect_err("nothing listens on port 1");
        assert!(matches!(err, Error::Network { .. }));
    }

    #[test]
    fn test_invalid_proxy_is_configuration_error() {
        let proxy = ClientProxy {
            http: Some("http://[::1".to_string()),
            https: None,
            no_proxy: None,
        };
        let err = HttpClient::new("ua", Some(&proxy)).expect_err("bad proxy");
        assert!(matches!(err, Error::Configuration(_)));
    }
}
