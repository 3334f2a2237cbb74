//! Tiny Tiny RSS JSON API client.
//!
//! Every call is a `POST {hostname}/api/` with an `op` field and the session
//! id from `login`. Answers come wrapped in `{"seq", "status", "content"}`
//! where a non-zero status carries `content.error`.

use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::sync::Mutex;
use url::Url;

use super::http;
use super::{Article, Backend, BackendError, Feed, HeadlineQuery, SortOrder, ViewMode};

/// Virtual feed holding every article.
const ALL_ARTICLES_FEED: i64 = -4;
/// Category id selecting all real feeds.
const ALL_FEEDS_CATEGORY: i64 = -3;
/// Largest page `getHeadlines` will return.
const MAX_HEADLINES: usize = 200;

/// `updateArticle` field ids.
const FIELD_STARRED: u8 = 0;
const FIELD_UNREAD: u8 = 2;
/// `updateArticle` modes.
const MODE_FALSE: u8 = 0;
const MODE_TRUE: u8 = 1;
const MODE_TOGGLE: u8 = 2;

pub struct TtRss {
    client: reqwest::Client,
    endpoint: Url,
    username: String,
    password: SecretString,
    session: Mutex<Option<SecretString>>,
}

impl std::fmt::Debug for TtRss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtRss")
            .field("endpoint", &self.endpoint.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct Envelope {
    status: i64,
    #[serde(default)]
    content: Value,
}

#[derive(Deserialize)]
struct LoginContent {
    session_id: String,
}

#[derive(Deserialize)]
struct FeedRow {
    #[serde(deserialize_with = "lenient_i64")]
    id: i64,
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct HeadlineRow {
    #[serde(deserialize_with = "lenient_i64")]
    id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(deserialize_with = "lenient_i64")]
    feed_id: i64,
    #[serde(default)]
    feed_title: String,
    #[serde(default)]
    unread: bool,
    #[serde(default)]
    is_updated: bool,
}

impl From<HeadlineRow> for Article {
    fn from(row: HeadlineRow) -> Self {
        Article {
            id: row.id,
            title: row.title,
            link: row.link,
            feed_id: row.feed_id,
            feed_title: row.feed_title,
            unread: row.unread,
            is_updated: row.is_updated,
        }
    }
}

#[derive(Deserialize)]
struct UnreadContent {
    #[serde(deserialize_with = "lenient_i64")]
    unread: i64,
}

/// TT-RSS sends some numbers as JSON strings depending on version.
fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        Text(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl TtRss {
    /// Client for the TT-RSS instance at `hostname` (the URL TT-RSS is served from).
    pub fn new(
        hostname: &str,
        username: impl Into<String>,
        password: SecretString,
    ) -> Result<Self, BackendError> {
        let endpoint = Url::parse(&format!("{}/api/", hostname.trim_end_matches('/')))?;
        Ok(Self {
            client: http::client()?,
            endpoint,
            username: username.into(),
            password,
            session: Mutex::new(None),
        })
    }

    fn session_id(&self) -> Option<String> {
        self.session
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|sid| sid.expose_secret().to_string()))
    }

    /// Run `op`, logging in again once if the session has expired.
    async fn call<T: DeserializeOwned>(&self, op: &str, params: Value) -> Result<T, BackendError> {
        match self.call_once(op, &params, self.session_id().as_deref()).await {
            Err(BackendError::NotLoggedIn) => {
                tracing::info!(op = op, "TT-RSS session expired, logging in again");
                self.login().await?;
                self.call_once(op, &params, self.session_id().as_deref())
                    .await
            }
            other => other,
        }
    }

    async fn call_once<T: DeserializeOwned>(
        &self,
        op: &str,
        params: &Value,
        sid: Option<&str>,
    ) -> Result<T, BackendError> {
        let mut body = params.clone();
        if let Some(map) = body.as_object_mut() {
            map.insert("op".into(), Value::from(op));
            if let Some(sid) = sid {
                map.insert("sid".into(), Value::from(sid));
            }
        }

        let request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&body)?);
        let envelope: Envelope = http::read_json(http::send(request).await?).await?;

        if envelope.status != 0 {
            let error = envelope
                .content
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            if error == "NOT_LOGGED_IN" {
                return Err(BackendError::NotLoggedIn);
            }
            return Err(BackendError::Api(error.to_string()));
        }

        Ok(serde_json::from_value(envelope.content)?)
    }

    async fn update_article(&self, article_id: i64, field: u8, mode: u8) -> Result<(), BackendError> {
        let _: Value = self
            .call(
                "updateArticle",
                json!({
                    "article_ids": article_id.to_string(),
                    "field": field,
                    "mode": mode,
                }),
            )
            .await?;
        Ok(())
    }
}

impl Backend for TtRss {
    async fn login(&self) -> Result<(), BackendError> {
        let params = json!({
            "user": self.username,
            "password": self.password.expose_secret(),
        });
        let content: LoginContent = match self.call_once("login", &params, None).await {
            Ok(content) => content,
            Err(BackendError::Api(reason)) => return Err(BackendError::Auth(reason)),
            Err(e) => return Err(e),
        };

        if let Ok(mut session) = self.session.lock() {
            *session = Some(SecretString::from(content.session_id));
        }
        tracing::debug!(endpoint = %self.endpoint, "Logged in to TT-RSS");
        Ok(())
    }

    async fn feeds(&self) -> Result<Vec<Feed>, BackendError> {
        let rows: Vec<FeedRow> = self
            .call("getFeeds", json!({ "cat_id": ALL_FEEDS_CATEGORY }))
            .await?;
        Ok(rows
            .into_iter()
            .filter(|row| row.id > 0)
            .map(|row| Feed {
                id: row.id,
                title: row.title,
            })
            .collect())
    }

    async fn headlines(&self, query: &HeadlineQuery) -> Result<Vec<Article>, BackendError> {
        let view_mode = match query.view_mode {
            ViewMode::Unread => "unread",
            ViewMode::All => "all_articles",
            ViewMode::Starred => "marked",
        };

        let mut params = json!({
            "feed_id": query.feed_id.unwrap_or(ALL_ARTICLES_FEED),
            "view_mode": view_mode,
            "limit": query.limit.unwrap_or(MAX_HEADLINES).min(MAX_HEADLINES),
            "show_excerpt": false,
            "show_content": false,
        });
        if let Some(map) = params.as_object_mut() {
            if let Some(since_id) = query.since_id {
                map.insert("since_id".into(), Value::from(since_id));
            }
            if let Some(offset) = query.offset {
                map.insert("skip".into(), Value::from(offset));
            }
            if query.order == SortOrder::OldestFirst {
                map.insert("order_by".into(), Value::from("date_reverse"));
            }
        }

        let rows: Vec<HeadlineRow> = self.call("getHeadlines", params).await?;
        Ok(rows.into_iter().map(Article::from).collect())
    }

    async fn unread_count(&self) -> Result<i64, BackendError> {
        let content: UnreadContent = self.call("getUnread", json!({})).await?;
        Ok(content.unread)
    }

    async fn mark_read(&self, article_id: i64) -> Result<(), BackendError> {
        self.update_article(article_id, FIELD_UNREAD, MODE_FALSE).await
    }

    async fn mark_starred(&self, article_id: i64) -> Result<(), BackendError> {
        self.update_article(article_id, FIELD_STARRED, MODE_TRUE).await
    }

    async fn toggle_starred(&self, article_id: i64) -> Result<(), BackendError> {
        self.update_article(article_id, FIELD_STARRED, MODE_TOGGLE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ok(content: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "seq": 0, "status": 0, "content": content }))
    }

    fn api_error(error: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(json!({ "seq": 0, "status": 1, "content": { "error": error } }))
    }

    async fn logged_in(server: &MockServer) -> TtRss {
        Mock::given(method("POST"))
            .and(path("/api/"))
            .and(body_partial_json(json!({ "op": "login", "user": "me" })))
            .respond_with(ok(json!({ "session_id": "sid-1", "api_level": 18 })))
            .mount(server)
            .await;

        let backend = TtRss::new(&server.uri(), "me", SecretString::from("pw")).unwrap();
        backend.login().await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/"))
            .respond_with(api_error("LOGIN_ERROR"))
            .mount(&server)
            .await;

        let backend = TtRss::new(&server.uri(), "me", SecretString::from("bad")).unwrap();
        match backend.login().await {
            Err(BackendError::Auth(reason)) => assert_eq!(reason, "LOGIN_ERROR"),
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_headlines_parse_string_ids() {
        let server = MockServer::start().await;
        let backend = logged_in(&server).await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "op": "getHeadlines",
                "sid": "sid-1",
                "view_mode": "unread",
                "since_id": 500,
                "order_by": "date_reverse",
            })))
            .respond_with(ok(json!([
                {
                    "id": 501, "title": "Storm hits coast", "link": "https://news/x",
                    "feed_id": "12", "feed_title": "News", "unread": true, "is_updated": false
                },
                {
                    "id": "502", "title": "Other", "feed_id": 13, "unread": true, "is_updated": true
                }
            ])))
            .mount(&server)
            .await;

        let articles = backend
            .headlines(
                &HeadlineQuery::unread()
                    .since(500)
                    .order(SortOrder::OldestFirst),
            )
            .await
            .unwrap();

        assert_eq!(articles.len(), 2);
        assert_eq!(
            articles[0],
            Article {
                id: 501,
                title: "Storm hits coast".into(),
                link: "https://news/x".into(),
                feed_id: 12,
                feed_title: "News".into(),
                unread: true,
                is_updated: false,
            }
        );
        assert_eq!(articles[1].id, 502);
        assert_eq!(articles[1].link, "");
        assert!(articles[1].is_updated);
    }

    #[tokio::test]
    async fn test_feeds_skip_virtual() {
        let server = MockServer::start().await;
        let backend = logged_in(&server).await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "op": "getFeeds", "cat_id": -3 })))
            .respond_with(ok(json!([
                { "id": 3, "title": "News" },
                { "id": -1, "title": "Starred articles" },
                { "id": "7", "title": "Blog" }
            ])))
            .mount(&server)
            .await;

        let feeds = backend.feeds().await.unwrap();
        assert_eq!(
            feeds,
            vec![
                Feed { id: 3, title: "News".into() },
                Feed { id: 7, title: "Blog".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_unread_count_from_string() {
        let server = MockServer::start().await;
        let backend = logged_in(&server).await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "op": "getUnread" })))
            .respond_with(ok(json!({ "unread": "42" })))
            .mount(&server)
            .await;

        assert_eq!(backend.unread_count().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_mark_calls_update_article() {
        let server = MockServer::start().await;
        let backend = logged_in(&server).await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "op": "updateArticle", "article_ids": "9", "field": 2, "mode": 0
            })))
            .respond_with(ok(json!({ "status": "OK", "updated": 1 })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "op": "updateArticle", "article_ids": "9", "field": 0, "mode": 1
            })))
            .respond_with(ok(json!({ "status": "OK", "updated": 1 })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "op": "updateArticle", "article_ids": "9", "field": 0, "mode": 2
            })))
            .respond_with(ok(json!({ "status": "OK", "updated": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        backend.mark_read(9).await.unwrap();
        backend.mark_starred(9).await.unwrap();
        backend.toggle_starred(9).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_session_logs_in_again() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "op": "login" })))
            .respond_with(ok(json!({ "session_id": "sid-2" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "op": "getUnread", "sid": "stale" })))
            .respond_with(api_error("NOT_LOGGED_IN"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "op": "getUnread", "sid": "sid-2" })))
            .respond_with(ok(json!({ "unread": 5 })))
            .mount(&server)
            .await;

        let backend = TtRss::new(&server.uri(), "me", SecretString::from("pw")).unwrap();
        *backend.session.lock().unwrap() = Some(SecretString::from("stale"));

        assert_eq!(backend.unread_count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_api_error_surfaces() {
        let server = MockServer::start().await;
        let backend = logged_in(&server).await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "op": "getFeeds" })))
            .respond_with(api_error("API_DISABLED"))
            .mount(&server)
            .await;

        match backend.feeds().await {
            Err(BackendError::Api(reason)) => assert_eq!(reason, "API_DISABLED"),
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_debug_hides_password() {
        let backend = TtRss::new("https://rss.example.com", "me", SecretString::from("hunter2")).unwrap();
        let debug = format!("{backend:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("https://rss.example.com/api/"));
    }
}
