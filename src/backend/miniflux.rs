//! Miniflux REST API client, authenticated with an API token.

use chrono::{DateTime, FixedOffset};
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::http;
use super::{Article, Backend, BackendError, Feed, HeadlineQuery, SortOrder, ViewMode};

const AUTH_HEADER: &str = "X-Auth-Token";

pub struct Miniflux {
    client: reqwest::Client,
    base: Url,
    token: SecretString,
}

impl std::fmt::Debug for Miniflux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Miniflux")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct FeedRow {
    id: i64,
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct EntryPage {
    #[serde(default)]
    total: i64,
    #[serde(default)]
    entries: Vec<Entry>,
}

#[derive(Deserialize)]
struct Entry {
    id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    feed_id: i64,
    #[serde(default)]
    status: String,
    feed: Option<FeedRow>,
    created_at: Option<DateTime<FixedOffset>>,
    changed_at: Option<DateTime<FixedOffset>>,
}

impl From<Entry> for Article {
    fn from(entry: Entry) -> Self {
        // changed_at moves past created_at when Miniflux rewrites the entry
        let is_updated = matches!(
            (entry.created_at, entry.changed_at),
            (Some(created), Some(changed)) if changed > created
        );
        let (feed_id, feed_title) = match entry.feed {
            Some(feed) => (feed.id, feed.title),
            None => (entry.feed_id, String::from("Unknown")),
        };
        Article {
            id: entry.id,
            title: entry.title,
            link: entry.url,
            feed_id,
            feed_title,
            unread: entry.status == "unread",
            is_updated,
        }
    }
}

impl Miniflux {
    pub fn new(hostname: &str, token: SecretString) -> Result<Self, BackendError> {
        let base = Url::parse(&format!("{}/", hostname.trim_end_matches('/')))?;
        Ok(Self {
            client: http::client()?,
            base,
            token,
        })
    }

    fn url(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base.join(path)?)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, BackendError> {
        let request = self
            .client
            .get(url)
            .header(AUTH_HEADER, self.token.expose_secret());
        http::read_json(http::send(request).await?).await
    }

    async fn put(&self, url: Url, body: Option<serde_json::Value>) -> Result<(), BackendError> {
        let mut request = self
            .client
            .put(url)
            .header(AUTH_HEADER, self.token.expose_secret());
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(&body)?);
        }
        http::send(request).await?;
        Ok(())
    }

    fn entries_url(&self, query: &HeadlineQuery) -> Result<Url, BackendError> {
        let mut url = match query.feed_id {
            Some(feed_id) if feed_id > 0 => self.url(&format!("v1/feeds/{feed_id}/entries"))?,
            _ => self.url("v1/entries")?,
        };

        {
            let mut pairs = url.query_pairs_mut();
            match query.view_mode {
                ViewMode::Unread => {
                    pairs.append_pair("status", "unread");
                }
                ViewMode::All => {}
                ViewMode::Starred => {
                    pairs.append_pair("starred", "true");
                }
            }
            if let Some(since_id) = query.since_id {
                pairs.append_pair("after_entry_id", &since_id.to_string());
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if let Some(offset) = query.offset {
                pairs.append_pair("offset", &offset.to_string());
            }
            pairs.append_pair("order", "id");
            pairs.append_pair(
                "direction",
                match query.order {
                    SortOrder::NewestFirst => "desc",
                    SortOrder::OldestFirst => "asc",
                },
            );
        }

        Ok(url)
    }
}

impl Backend for Miniflux {
    async fn login(&self) -> Result<(), BackendError> {
        let url = self.url("v1/me")?;
        let request = self
            .client
            .get(url)
            .header(AUTH_HEADER, self.token.expose_secret());
        match http::send(request).await {
            Ok(_) => {
                tracing::debug!(base = %self.base, "Authenticated with Miniflux");
                Ok(())
            }
            Err(BackendError::HttpStatus(status)) => {
                Err(BackendError::Auth(format!("Miniflux answered status {status}")))
            }
            Err(e) => Err(e),
        }
    }

    async fn feeds(&self) -> Result<Vec<Feed>, BackendError> {
        let rows: Vec<FeedRow> = self.get(self.url("v1/feeds")?).await?;
        Ok(rows
            .into_iter()
            .map(|row| Feed {
                id: row.id,
                title: row.title,
            })
            .collect())
    }

    async fn headlines(&self, query: &HeadlineQuery) -> Result<Vec<Article>, BackendError> {
        let page: EntryPage = self.get(self.entries_url(query)?).await?;
        Ok(page.entries.into_iter().map(Article::from).collect())
    }

    async fn unread_count(&self) -> Result<i64, BackendError> {
        let mut url = self.url("v1/entries")?;
        url.query_pairs_mut()
            .append_pair("status", "unread")
            .append_pair("limit", "1");
        let page: EntryPage = self.get(url).await?;
        Ok(page.total)
    }

    async fn mark_read(&self, article_id: i64) -> Result<(), BackendError> {
        let body = json!({ "entry_ids": [article_id], "status": "read" });
        self.put(self.url("v1/entries")?, Some(body)).await
    }

    // Miniflux only exposes a bookmark toggle, so starring an already starred
    // entry unstars it.
    async fn mark_starred(&self, article_id: i64) -> Result<(), BackendError> {
        self.toggle_starred(article_id).await
    }

    async fn toggle_starred(&self, article_id: i64) -> Result<(), BackendError> {
        let url = self.url(&format!("v1/entries/{article_id}/bookmark"))?;
        self.put(url, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> Miniflux {
        Miniflux::new(&server.uri(), SecretString::from("token-1")).unwrap()
    }

    #[tokio::test]
    async fn test_login_checks_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/me"))
            .and(header("X-Auth-Token", "token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
            .mount(&server)
            .await;

        backend(&server).login().await.unwrap();
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        assert!(matches!(
            backend(&server).login().await,
            Err(BackendError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_unread_headlines_since() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/entries"))
            .and(query_param("status", "unread"))
            .and(query_param("after_entry_id", "500"))
            .and(query_param("direction", "asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 2,
                "entries": [
                    {
                        "id": 501, "title": "Storm hits coast", "url": "https://news/x",
                        "status": "unread", "feed_id": 4,
                        "feed": { "id": 4, "title": "News" },
                        "created_at": "2024-05-01T10:00:00Z",
                        "changed_at": "2024-05-01T10:00:00Z"
                    },
                    {
                        "id": 502, "title": "Edited", "url": "https://news/y",
                        "status": "unread", "feed_id": 5,
                        "feed": { "id": 5, "title": "Blog" },
                        "created_at": "2024-05-01T10:00:00+02:00",
                        "changed_at": "2024-05-02T08:00:00+02:00"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let articles = backend(&server)
            .headlines(
                &HeadlineQuery::unread()
                    .since(500)
                    .order(SortOrder::OldestFirst),
            )
            .await
            .unwrap();

        assert_eq!(
            articles[0],
            Article {
                id: 501,
                title: "Storm hits coast".into(),
                link: "https://news/x".into(),
                feed_id: 4,
                feed_title: "News".into(),
                unread: true,
                is_updated: false,
            }
        );
        assert!(articles[1].is_updated);
    }

    #[tokio::test]
    async fn test_feed_headlines_use_feed_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/feeds/7/entries"))
            .and(query_param("offset", "200"))
            .and(query_param("limit", "200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 1,
                "entries": [
                    { "id": 3, "title": "Old", "status": "read", "feed_id": 7 }
                ]
            })))
            .mount(&server)
            .await;

        let articles = backend(&server)
            .headlines(&HeadlineQuery::all().feed(7).limit(200).offset(200))
            .await
            .unwrap();
        assert_eq!(articles.len(), 1);
        assert!(!articles[0].unread);
        assert_eq!(articles[0].feed_id, 7);
        assert_eq!(articles[0].feed_title, "Unknown");
    }

    #[tokio::test]
    async fn test_unread_count_reads_total() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/entries"))
            .and(query_param("status", "unread"))
            .and(query_param("limit", "1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "total": 12, "entries": [] })),
            )
            .mount(&server)
            .await;

        assert_eq!(backend(&server).unread_count().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_mark_read_and_star() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/entries"))
            .and(body_json(json!({ "entry_ids": [9], "status": "read" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/entries/9/bookmark"))
            .respond_with(ResponseTemplate::new(204))
            .expect(2)
            .mount(&server)
            .await;

        let backend = backend(&server);
        backend.mark_read(9).await.unwrap();
        backend.mark_starred(9).await.unwrap();
        backend.toggle_starred(9).await.unwrap();
    }

    #[tokio::test]
    async fn test_feeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/feeds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 1, "title": "News", "feed_url": "https://news/rss" },
                { "id": 2, "title": "Blog" }
            ])))
            .mount(&server)
            .await;

        let feeds = backend(&server).feeds().await.unwrap();
        assert_eq!(
            feeds,
            vec![
                Feed { id: 1, title: "News".into() },
                Feed { id: 2, title: "Blog".into() },
            ]
        );
    }
}
