//! Single-page fetching for the paginated JSON API.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

use gregory_shared::{GregoryError, Page, Result};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("gregory-build/", env!("CARGO_PKG_VERSION"));

/// Fetches one page of a paginated collection.
///
/// Cloning is cheap: the underlying `reqwest::Client` is reference counted.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                GregoryError::fetch("<client>", None, format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client })
    }

    /// Fetch and decode the page at `url`.
    ///
    /// Transport failures, timeouts, non-2xx statuses and undecodable bodies
    /// all surface as [`GregoryError::Fetch`].
    pub async fn fetch(&self, url: &Url) -> Result<Page> {
        debug!(%url, "fetching page");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| GregoryError::fetch(url.as_str(), None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GregoryError::fetch(
                url.as_str(),
                Some(status.as_u16()),
                status.canonical_reason().unwrap_or("unexpected status"),
            ));
        }

        response.json::<Page>().await.map_err(|e| {
            GregoryError::fetch(
                url.as_str(),
                Some(status.as_u16()),
                format!("body decode failed: {e}"),
            )
        })
    }
}

/// URL of page `page` of the collection at `base`, replacing any existing `page` parameter.
pub fn page_url(base: &Url, page: u64) -> Url {
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = base.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("page", &page.to_string());
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn page_url_appends_page_param() {
        let base = Url::parse("https://api.example.com/articles/?format=json").unwrap();
        assert_eq!(
            page_url(&base, 3).as_str(),
            "https://api.example.com/articles/?format=json&page=3"
        );
    }

    #[test]
    fn page_url_replaces_existing_page_param() {
        let base = Url::parse("https://api.example.com/trials/?page=1&format=json").unwrap();
        assert_eq!(
            page_url(&base, 2).as_str(),
            "https://api.example.com/trials/?format=json&page=2"
        );
    }

    #[tokio::test]
    async fn fetch_decodes_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/articles/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1,
                "next": null,
                "results": [{"article_id": 1}]
            })))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/articles/?format=json", server.uri())).unwrap();
        let page = fetcher.fetch(&url).await.unwrap();
        assert_eq!(page.count, Some(1));
        assert_eq!(page.results.len(), 1);
    }

    #[tokio::test]
    async fn fetch_maps_http_status_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/trials/", server.uri())).unwrap();
        match fetcher.fetch(&url).await {
            Err(GregoryError::Fetch { status, url: failed, .. }) => {
                assert_eq!(status, Some(503));
                assert!(failed.ends_with("/trials/"));
            }
            other => panic!("expected fetch error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"results": []}))
                    .set_delay(Duration::from_millis(800)),
            )
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(Duration::from_millis(100)).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        match fetcher.fetch(&url).await {
            Err(GregoryError::Fetch { status, .. }) => assert_eq!(status, None),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_rejects_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(err.to_string().contains("body decode failed"));
    }
}
