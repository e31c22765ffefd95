//! DuckDuckGo HTML search provider

use super::{status_error, RawHit, SearchProvider};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// Scrapes the no-JavaScript DuckDuckGo results page
pub struct DuckDuckGoProvider {
    client: Client,
    endpoint: Url,
}

impl DuckDuckGoProvider {
    pub fn new(client: Client, endpoint: &str) -> Result<Self> {
        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
        })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawHit>> {
        debug!("DuckDuckGo search: {}", query);

        let response = self
            .client
            .post(self.endpoint.clone())
            .form(&[("q", query)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("DuckDuckGo", status));
        }

        let body = response.text().await?;
        let mut hits = parse_results(&body)?;
        hits.truncate(limit.max(1) * 2);
        Ok(hits)
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Other(format!("Invalid selector '{}': {:?}", css, e)))
}

/// Parse organic results out of a DuckDuckGo HTML results page
pub fn parse_results(html: &str) -> Result<Vec<RawHit>> {
    let document = Html::parse_document(html);
    let result_sel = selector("div.result")?;
    let link_sel = selector("a.result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let mut hits = Vec::new();
    for result in document.select(&result_sel) {
        let is_ad = result
            .value()
            .classes()
            .any(|c| c == "result--ad" || c == "result--ad--small");
        if is_ad {
            continue;
        }

        let Some(link) = result.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(url) = unwrap_redirect(href) else {
            continue;
        };

        let title = collapse(&link.text().collect::<String>());
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(|s| collapse(&s.text().collect::<String>()))
            .unwrap_or_default();

        hits.push(RawHit {
            url,
            title,
            snippet,
        });
    }

    Ok(hits)
}

/// Resolve `//duckduckgo.com/l/?uddg=<target>` redirect links to their target
pub fn unwrap_redirect(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{}", href)
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&absolute).ok()?;
    let is_redirect = parsed
        .host_str()
        .is_some_and(|h| h.ends_with("duckduckgo.com"))
        && parsed.path().starts_with("/l/");

    if is_redirect {
        parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())
    } else {
        Some(absolute)
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RESULTS_PAGE: &str = r#"
        <html><body>
        <div class="result results_links result--ad">
          <a class="result__a" href="https://ads.example/buy">Sponsored</a>
        </div>
        <div class="result results_links">
          <h2 class="result__title">
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fen.wikipedia.org%2Fwiki%2FParis&amp;rut=abc">
              Paris - <b>Wikipedia</b>
            </a>
          </h2>
          <a class="result__snippet">Paris is the capital and largest city of France.</a>
        </div>
        <div class="result results_links">
          <a class="result__a" href="https://www.britannica.com/place/Paris">Paris | Britannica</a>
          <div class="result__snippet">Capital of France.</div>
        </div>
        <div class="result"><span>no link here</span></div>
        </body></html>
    "#;

    #[test]
    fn test_parse_results() {
        let hits = parse_results(RESULTS_PAGE).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://en.wikipedia.org/wiki/Paris");
        assert_eq!(hits[0].title, "Paris - Wikipedia");
        assert_eq!(
            hits[0].snippet,
            "Paris is the capital and largest city of France."
        );
        assert_eq!(hits[1].url, "https://www.britannica.com/place/Paris");
    }

    #[test]
    fn test_unwrap_redirect() {
        assert_eq!(
            unwrap_redirect("//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fa%3Fb%3D1")
                .as_deref(),
            Some("https://example.com/a?b=1")
        );
        assert_eq!(
            unwrap_redirect("https://example.com/direct").as_deref(),
            Some("https://example.com/direct")
        );
        assert_eq!(unwrap_redirect("//duckduckgo.com/l/?rut=only"), None);
    }

    #[tokio::test]
    async fn test_provider_posts_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/html/"))
            .and(body_string_contains("q=capital+of+France"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RESULTS_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let provider =
            DuckDuckGoProvider::new(Client::new(), &format!("{}/html/", server.uri())).unwrap();
        let hits = provider.search("capital of France", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_provider_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider =
            DuckDuckGoProvider::new(Client::new(), &format!("{}/html/", server.uri())).unwrap();
        let err = provider.search("anything", 10).await.unwrap_err();
        assert!(matches!(err, Error::SearchUnavailable(_)));
    }

    #[tokio::test]
    async fn test_provider_rejected_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let provider =
            DuckDuckGoProvider::new(Client::new(), &format!("{}/html/", server.uri())).unwrap();
        let err = provider.search("anything", 10).await.unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }
}
