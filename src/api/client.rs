//! Redash HTTP API client.

use std::future::Future;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use tracing::{debug, info};

use crate::models::{PageResponse, QueryRecord};

const QUERIES_PATH: &str = "/api/queries";

/// Build the queries listing URL from a Redash base URL.
///
/// Trailing slashes on the base path are dropped before `/api/queries` is
/// appended, so `https://redash.example.com/` and
/// `https://redash.example.com` resolve to the same endpoint.
pub fn queries_url(base_url: &str) -> Result<Url> {
    let mut url =
        Url::parse(base_url).with_context(|| format!("Invalid Redash URL: {}", base_url))?;
    let path = format!("{}{}", url.path().trim_end_matches('/'), QUERIES_PATH);
    url.set_path(&path);
    Ok(url)
}

/// Drive the page loop against any page source.
///
/// Pages are requested 1, 2, 3, ... and their results concatenated in that
/// order. No dedup is done across pages.
pub async fn collect_pages<F, Fut>(mut fetch_page: F) -> Result<Vec<QueryRecord>>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<PageResponse>>,
{
    let mut results = Vec::new();
    let mut page = 1;

    loop {
        let content = fetch_page(page).await?;
        if content.page_size == 0 && content.count > 0 {
            anyhow::bail!(
                "Malformed response for page {}: page_size is 0 but count is {}",
                page,
                content.count
            );
        }

        let done = content.is_last(page);
        debug!(
            page,
            count = content.count,
            page_size = content.page_size,
            received = content.results.len(),
            "fetched page"
        );
        results.extend(content.results);

        if done {
            break;
        }
        page += 1;
    }

    Ok(results)
}

/// Redash HTTP API client with the API key baked into its default headers.
pub struct RedashClient {
    client: Client,
    queries_url: Url,
}

impl RedashClient {
    /// Create a new client for the Redash instance at `base_url`.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Key {}", api_key))
            .context("API key contains characters not allowed in a header")?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            queries_url: queries_url(base_url)?,
        })
    }

    /// Fetch a single page of saved queries.
    pub async fn get_page(&self, page: u64) -> Result<PageResponse> {
        let response = self
            .client
            .get(self.queries_url.clone())
            .query(&[("page", page)])
            .send()
            .await
            .with_context(|| format!("Failed to request page {}", page))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("API request failed: {} - {}", status, text);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response for page {}", page))
    }

    /// Fetch every saved query, page by page.
    pub async fn fetch_all(&self) -> Result<Vec<QueryRecord>> {
        info!(url = %self.queries_url, "fetching queries");
        let records = collect_pages(|page| self.get_page(page)).await?;
        info!(count = records.len(), "fetched queries");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn record(id: i64) -> QueryRecord {
        QueryRecord {
            id,
            name: format!("q{}", id),
            query: format!("select {}", id),
        }
    }

    /// Serve `count` records in pages of `page_size`, recording requested pages.
    fn serve(count: u64, page_size: u64, requested: &RefCell<Vec<u64>>, page: u64) -> PageResponse {
        requested.borrow_mut().push(page);
        let start = (page - 1) * page_size;
        let end = (start + page_size).min(count);
        PageResponse {
            count,
            page_size,
            results: (start..end).map(|id| record(id as i64 + 1)).collect(),
        }
    }

    #[test]
    fn test_queries_url_strips_trailing_slashes() {
        let url = queries_url("https://redash.example.com/redash///").unwrap();
        assert_eq!(url.as_str(), "https://redash.example.com/redash/api/queries");
    }

    #[test]
    fn test_queries_url_root_and_port() {
        let url = queries_url("http://localhost:5000/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/api/queries");

        let url = queries_url("http://localhost:5000").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/api/queries");
    }

    #[test]
    fn test_queries_url_rejects_garbage() {
        assert!(queries_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_collect_pages_five_by_two() {
        let requested = RefCell::new(Vec::new());
        let records = collect_pages(|p| {
            let page = serve(5, 2, &requested, p);
            async move { anyhow::Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(*requested.borrow(), vec![1, 2, 3]);
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_collect_pages_empty_still_requests_once() {
        let requested = RefCell::new(Vec::new());
        let records = collect_pages(|p| {
            let page = serve(0, 25, &requested, p);
            async move { anyhow::Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(*requested.borrow(), vec![1]);
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_collect_pages_request_count_is_ceil() {
        for (count, page_size) in [(1u64, 25u64), (25, 25), (26, 25), (100, 7)] {
            let requested = RefCell::new(Vec::new());
            let records = collect_pages(|p| {
                let page = serve(count, page_size, &requested, p);
                async move { anyhow::Ok(page) }
            })
            .await
            .unwrap();

            let expected = count.div_ceil(page_size);
            assert_eq!(requested.borrow().len() as u64, expected, "count={count}");
            assert_eq!(records.len() as u64, count);
        }
    }

    #[tokio::test]
    async fn test_collect_pages_keeps_duplicates() {
        // Backend shifted between requests: record 2 shows up twice.
        let records = collect_pages(|p| async move {
            let results = match p {
                1 => vec![record(1), record(2)],
                _ => vec![record(2), record(3)],
            };
            anyhow::Ok(PageResponse {
                count: 4,
                page_size: 2,
                results,
            })
        })
        .await
        .unwrap();

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 2, 3]);
    }

    #[tokio::test]
    async fn test_collect_pages_propagates_errors() {
        let result = collect_pages(|p| async move {
            if p == 2 {
                anyhow::bail!("connection reset");
            }
            anyhow::Ok(PageResponse {
                count: 10,
                page_size: 2,
                results: vec![record(1), record(2)],
            })
        })
        .await;

        assert!(result.unwrap_err().to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_collect_pages_rejects_zero_page_size() {
        let result = collect_pages(|_| async move {
            anyhow::Ok(PageResponse {
                count: 3,
                page_size: 0,
                results: vec![],
            })
        })
        .await;

        assert!(result.is_err());
    }

    #[test]
    fn test_client_rejects_newline_in_key() {
        assert!(RedashClient::new("https://redash.example.com", "bad\nkey").is_err());
    }

    fn page_body(count: u64, page_size: u64, ids: &[i64]) -> String {
        let results: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| serde_json::json!({"id": id, "name": format!("q{}", id), "query": format!("select {}", id), "is_draft": false}))
            .collect();
        serde_json::json!({"count": count, "page_size": page_size, "results": results}).to_string()
    }

    async fn mock_page(
        server: &mut mockito::ServerGuard,
        path: &str,
        page: u64,
        body: String,
    ) -> mockito::Mock {
        server
            .mock("GET", path)
            .match_query(mockito::Matcher::UrlEncoded("page".into(), page.to_string()))
            .match_header("authorization", "Key secret-key")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(1)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_fetch_all_walks_pages_with_key_header() {
        let mut server = mockito::Server::new_async().await;
        let page1 = mock_page(&mut server, "/api/queries", 1, page_body(5, 2, &[1, 2])).await;
        let page2 = mock_page(&mut server, "/api/queries", 2, page_body(5, 2, &[3, 4])).await;
        let page3 = mock_page(&mut server, "/api/queries", 3, page_body(5, 2, &[5])).await;

        let client = RedashClient::new(&server.url(), "secret-key").unwrap();
        let records = client.fetch_all().await.unwrap();

        page1.assert_async().await;
        page2.assert_async().await;
        page3.assert_async().await;
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(records[4].query, "select 5");
    }

    #[tokio::test]
    async fn test_fetch_all_empty_instance_makes_one_request() {
        let mut server = mockito::Server::new_async().await;
        let page1 = mock_page(&mut server, "/api/queries", 1, page_body(0, 25, &[])).await;

        let client = RedashClient::new(&server.url(), "secret-key").unwrap();
        let records = client.fetch_all().await.unwrap();

        page1.assert_async().await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_all_keeps_base_path() {
        let mut server = mockito::Server::new_async().await;
        let page1 =
            mock_page(&mut server, "/redash/api/queries", 1, page_body(1, 25, &[9])).await;

        let base = format!("{}/redash//", server.url());
        let client = RedashClient::new(&base, "secret-key").unwrap();
        let records = client.fetch_all().await.unwrap();

        page1.assert_async().await;
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_all_surfaces_http_status() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/api/queries")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body("internal error")
            .expect(1)
            .create_async()
            .await;

        let client = RedashClient::new(&server.url(), "secret-key").unwrap();
        let err = client.fetch_all().await.unwrap_err();

        failing.assert_async().await;
        let message = err.to_string();
        assert!(message.contains("API request failed"), "{message}");
        assert!(message.contains("500"), "{message}");
        assert!(message.contains("internal error"), "{message}");
    }

    #[tokio::test]
    async fn test_fetch_all_rejects_non_json_body() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/api/queries")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body("<html>login</html>")
            .create_async()
            .await;

        let client = RedashClient::new(&server.url(), "secret-key").unwrap();
        let err = client.fetch_all().await.unwrap_err();

        assert!(err.to_string().contains("Failed to parse response for page 1"));
    }
}
