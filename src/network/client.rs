use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use tracing::debug;
use url::Url;

use crate::cache::Response;

use super::types::Request;

/// Something that can issue a request over the network.
///
/// Any resolved response counts as success, whatever its status; only a
/// transport failure is an error.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// HTTP fetcher backed by reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  origin: Url,
  offline: bool,
}

impl HttpFetcher {
  pub fn new(origin: Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("sitecache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      origin,
      offline: false,
    })
  }

  /// Fail every request immediately, as if the network were down.
  pub fn with_offline(mut self, offline: bool) -> Self {
    self.offline = offline;
    self
  }

  #[allow(dead_code)]
  pub fn origin(&self) -> &Url {
    &self.origin
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    if self.offline {
      return Err(eyre!("Network unavailable: {} {}", request.method, request.url));
    }

    let response = self
      .client
      .request(request.method.clone(), request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| match String::from_utf8(value.as_bytes().to_vec()) {
        Ok(value) => Some((name.as_str().to_string(), value)),
        Err(_) => {
          debug!(header = %name, url = %request.url, "dropping header that is not UTF-8");
          None
        }
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?
      .to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn fetcher(server: &MockServer) -> HttpFetcher {
    HttpFetcher::new(Url::parse(&server.uri()).unwrap()).unwrap()
  }

  #[tokio::test]
  async fn test_fetch_returns_status_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/data/videos.json"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_string("[1,2]")
          .insert_header("x-version", "7"),
      )
      .mount(&server)
      .await;

    let fetcher = fetcher(&server);
    let url = fetcher.origin().join("/data/videos.json").unwrap();
    let response = fetcher.fetch(&Request::get(url)).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "[1,2]");
    assert_eq!(response.header("x-version"), Some("7"));
  }

  #[tokio::test]
  async fn test_non_ascii_header_values_are_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/index.html"))
      .respond_with(
        ResponseTemplate::new(200)
          .insert_header("x-title", "café")
          .insert_header("x-raw", reqwest::header::HeaderValue::from_bytes(&[0xff]).unwrap()),
      )
      .mount(&server)
      .await;

    let fetcher = fetcher(&server);
    let url = fetcher.origin().join("/index.html").unwrap();
    let response = fetcher.fetch(&Request::get(url)).await.unwrap();

    assert_eq!(response.header("x-title"), Some("café"));
    assert_eq!(response.header("x-raw"), None);
  }

  #[tokio::test]
  async fn test_error_status_is_not_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/missing"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&server)
      .await;

    let fetcher = fetcher(&server);
    let url = fetcher.origin().join("/missing").unwrap();
    let response = fetcher.fetch(&Request::get(url)).await.unwrap();

    assert_eq!(response.status, 404);
  }

  #[tokio::test]
  async fn test_offline_switch_fails_without_contacting_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200))
      .expect(0)
      .mount(&server)
      .await;

    let fetcher = fetcher(&server).with_offline(true);
    let url = fetcher.origin().join("/").unwrap();

    assert!(fetcher.fetch(&Request::get(url)).await.is_err());
  }

  #[tokio::test]
  async fn test_connection_refused_is_a_failure() {
    let server = MockServer::start().await;
    let origin = Url::parse(&server.uri()).unwrap();
    drop(server);

    let fetcher = HttpFetcher::new(origin.clone()).unwrap();
    let result = fetcher.fetch(&Request::get(origin)).await;

    assert!(result.is_err());
  }
}
