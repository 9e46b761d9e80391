//! Mastodon API client

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::models::{
    AccountSnapshot, Cursor, FeedKind, FeedRecord, InstanceMetadata, Notification,
    NotificationType, Page, Status,
};

use super::MastodonApi;

/// Page size for relationship listings (server maximum)
const RELATIONSHIP_PAGE_LIMIT: usize = 80;

/// Mastodon API client
pub struct MastodonClient {
    client: Client,
    instance: String,
    access_token: String,
}

impl MastodonClient {
    /// Create a new Mastodon client
    pub fn new(instance: &str, access_token: &str) -> Self {
        Self {
            client: Client::new(),
            instance: instance.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    /// Build API URL
    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/v1{}", self.instance, endpoint)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bearer {}", self.access_token))
    }

    /// GET a JSON listing and the `max_id` cursor of its `Link: rel="next"`
    async fn get_page<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<(T, Option<Cursor>)> {
        let response = self
            .authorized(self.client.get(with_query(url, query)))
            .send()
            .await
            .with_context(|| format!("Failed to fetch {what}"))?;

        let response = check_status(response).await?;
        let next = response
            .headers()
            .get("link")
            .and_then(|v| v.to_str().ok())
            .and_then(next_max_id);

        let body = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {what} response"))?;

        Ok((body, next))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let (body, _) = self.get_page(url, &[], what).await?;
        Ok(body)
    }

    async fn statuses(&self, url: &str, query: Vec<(&str, String)>, kind: &FeedKind) -> Result<Page<FeedRecord>> {
        let (statuses, next): (Vec<MastodonStatus>, _) =
            self.get_page(url, &query, "timeline").await?;
        Ok(Page::new(statuses, next).map(|s| FeedRecord::status(kind.clone(), s.into_status())))
    }

    async fn notifications(
        &self,
        query: Vec<(&str, String)>,
        kind: &FeedKind,
    ) -> Result<Page<FeedRecord>> {
        let url = self.api_url("/notifications");
        let (notifications, next): (Vec<MastodonNotification>, _) =
            self.get_page(&url, &query, "notifications").await?;
        Ok(Page::new(notifications, next)
            .map(|n| FeedRecord::notification(kind.clone(), n.into_notification())))
    }
}

impl MastodonApi for MastodonClient {
    async fn following(&self, user_id: &str, max_id: Option<&Cursor>) -> Result<Page<String>> {
        let url = self.api_url(&format!("/accounts/{}/following", urlencoding::encode(user_id)));
        let mut query = vec![("limit", RELATIONSHIP_PAGE_LIMIT.to_string())];
        if let Some(cursor) = max_id {
            query.push(("max_id", cursor.to_string()));
        }

        let (accounts, next): (Vec<MastodonAccount>, _) =
            self.get_page(&url, &query, "following").await?;
        Ok(Page::new(accounts, next).map(|a| a.id))
    }

    async fn blocked(&self) -> Result<Vec<String>> {
        let url = self.api_url("/blocks");
        let query = [("limit", RELATIONSHIP_PAGE_LIMIT.to_string())];
        let (accounts, _): (Vec<MastodonAccount>, _) =
            self.get_page(&url, &query, "blocked accounts").await?;
        Ok(accounts.into_iter().map(|a| a.id).collect())
    }

    async fn follow_requests(&self) -> Result<Vec<String>> {
        let url = self.api_url("/follow_requests");
        let query = [("limit", RELATIONSHIP_PAGE_LIMIT.to_string())];
        let (accounts, _): (Vec<MastodonAccount>, _) =
            self.get_page(&url, &query, "follow requests").await?;
        Ok(accounts.into_iter().map(|a| a.id).collect())
    }

    async fn feed_page(
        &self,
        kind: &FeedKind,
        max_id: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page<FeedRecord>> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = max_id {
            query.push(("max_id", cursor.to_string()));
        }

        match kind {
            FeedKind::Home => {
                let url = self.api_url("/timelines/home");
                self.statuses(&url, query, kind).await
            }
            FeedKind::Local => {
                query.push(("local", "true".to_string()));
                let url = self.api_url("/timelines/public");
                self.statuses(&url, query, kind).await
            }
            FeedKind::Federated => {
                let url = self.api_url("/timelines/public");
                self.statuses(&url, query, kind).await
            }
            FeedKind::AccountStatuses(account_id) => {
                let url = self.api_url(&format!(
                    "/accounts/{}/statuses",
                    urlencoding::encode(account_id)
                ));
                self.statuses(&url, query, kind).await
            }
            FeedKind::NotificationAll => self.notifications(query, kind).await,
            FeedKind::NotificationMentions => {
                query.push(("types[]", "mention".to_string()));
                self.notifications(query, kind).await
            }
            FeedKind::NotificationAccount(account_id) => {
                query.push(("account_id", account_id.clone()));
                self.notifications(query, kind).await
            }
        }
    }

    async fn verify_credentials(&self) -> Result<AccountSnapshot> {
        let url = self.api_url("/accounts/verify_credentials");
        let account: MastodonAccount = self.get_json(&url, "account").await?;
        Ok(account.into_snapshot())
    }

    async fn instance(&self) -> Result<InstanceMetadata> {
        let url = format!("{}/api/v2/instance", self.instance);
        let instance: MastodonInstance = self.get_json(&url, "instance").await?;

        Ok(InstanceMetadata {
            title: instance.title,
            version: instance.version,
            max_status_characters: instance
                .configuration
                .and_then(|c| c.statuses)
                .and_then(|s| s.max_characters),
            translation_languages: std::collections::BTreeMap::new(),
        })
    }

    async fn cancel_subscription(&self) -> Result<()> {
        let url = self.api_url("/push/subscription");

        let response = self
            .authorized(self.client.delete(&url))
            .send()
            .await
            .context("Failed to cancel push subscription")?;

        // No subscription is as good as a cancelled one
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    bail!("Mastodon error {status}: {body}");
}

/// Append query parameters to `url`, percent-encoding the values
fn with_query(url: &str, query: &[(&str, String)]) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let params: Vec<String> = query
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect();
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{}", params.join("&"))
}

/// Extract the `max_id` of the `rel="next"` entry of a `Link` header
pub fn next_max_id(link: &str) -> Option<Cursor> {
    let entry = regex_lite::Regex::new(r#"<([^>]+)>\s*;\s*rel="next""#).ok()?;
    let max_id = regex_lite::Regex::new(r"[?&]max_id=([^&>]+)").ok()?;

    let url = entry.captures(link)?.get(1)?.as_str();
    let raw = max_id.captures(url)?.get(1)?.as_str();
    let decoded = urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |s| s.into_owned());
    Some(Cursor::new(decoded))
}

/// Strip HTML from status content
fn strip_html(html: &str) -> String {
    let content = html_escape::decode_html_entities(html)
        .to_string()
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p><p>", "\n\n");

    regex_lite::Regex::new(r"<[^>]+>")
        .map(|re| re.replace_all(&content, "").to_string())
        .unwrap_or(content)
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

// ==================== API Types ====================

#[derive(Debug, Deserialize)]
struct MastodonStatus {
    id: String,
    created_at: String,
    content: String,
    url: Option<String>,
    account: MastodonAccount,
    reblog: Option<Box<Self>>,
    favourites_count: u32,
    reblogs_count: u32,
    replies_count: u32,
    favourited: Option<bool>,
    reblogged: Option<bool>,
    in_reply_to_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MastodonAccount {
    id: String,
    username: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    acct: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    followers_count: u64,
    #[serde(default)]
    following_count: u64,
}

#[derive(Debug, Deserialize)]
struct MastodonNotification {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    created_at: String,
    account: MastodonAccount,
    status: Option<MastodonStatus>,
}

#[derive(Debug, Deserialize)]
struct MastodonInstance {
    #[serde(default)]
    title: String,
    #[serde(default)]
    version: String,
    configuration: Option<InstanceConfiguration>,
}

#[derive(Debug, Deserialize)]
struct InstanceConfiguration {
    statuses: Option<StatusConfiguration>,
}

#[derive(Debug, Deserialize)]
struct StatusConfiguration {
    max_characters: Option<u32>,
}

impl MastodonAccount {
    fn into_snapshot(self) -> AccountSnapshot {
        AccountSnapshot {
            acct: if self.acct.is_empty() {
                self.username.clone()
            } else {
                self.acct
            },
            display_name: if self.display_name.is_empty() {
                self.username.clone()
            } else {
                self.display_name
            },
            id: self.id,
            username: self.username,
            avatar: self.avatar,
            created_at: self.created_at.as_deref().map(parse_time),
            followers_count: self.followers_count,
            following_count: self.following_count,
        }
    }
}

impl MastodonStatus {
    fn into_status(self) -> Status {
        // Boosts keep their own id (the feed entry) but show the boosted content
        if let Some(reblog) = self.reblog {
            let mut status = reblog.into_status();
            status.reblog_of = Some(std::mem::replace(&mut status.id, self.id));
            status.reblogged_by = Some(if self.account.display_name.is_empty() {
                self.account.username
            } else {
                self.account.display_name
            });
            return status;
        }

        let account = self.account.into_snapshot();

        Status {
            id: self.id,
            reblog_of: None,
            author_acct: account.acct,
            author_name: account.display_name,
            author_avatar: account.avatar,
            content: strip_html(&self.content),
            content_raw: Some(self.content),
            created_at: parse_time(&self.created_at),
            url: self.url,
            reblogged_by: None,
            favourites_count: self.favourites_count,
            reblogs_count: self.reblogs_count,
            replies_count: self.replies_count,
            favourited: self.favourited.unwrap_or(false),
            reblogged: self.reblogged.unwrap_or(false),
            in_reply_to_id: self.in_reply_to_id,
        }
    }
}

impl MastodonNotification {
    fn into_notification(self) -> Notification {
        Notification {
            id: self.id,
            kind: NotificationType::from_str(&self.kind),
            account: self.account.into_snapshot(),
            status: self.status.map(MastodonStatus::into_status),
            created_at: parse_time(&self.created_at),
        }
    }
}

/// OAuth authentication flow for Mastodon
pub mod oauth {
    use super::{Client, Context, Deserialize, Result, check_status};

    const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
    const SCOPES: &str = "read write follow push";

    /// Registered OAuth application credentials
    #[derive(Debug, Deserialize)]
    pub struct OAuthApp {
        /// OAuth client ID
        pub client_id: String,
        /// OAuth client secret
        pub client_secret: String,
    }

    /// OAuth access token response
    #[derive(Debug, Deserialize)]
    pub struct OAuthToken {
        /// Access token for API requests
        pub access_token: String,
        /// Token type (usually "Bearer")
        pub token_type: String,
    }

    /// Register an OAuth application with an instance
    pub async fn register_app(instance: &str) -> Result<OAuthApp> {
        let client = Client::new();
        let url = format!("{}/api/v1/apps", instance.trim_end_matches('/'));

        let params = [
            ("client_name", "Tusk"),
            ("redirect_uris", REDIRECT_URI),
            ("scopes", SCOPES),
        ];

        let response = client
            .post(&url)
            .form(&params)
            .send()
            .await
            .context("Failed to register app")?;

        check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse app registration response")
    }

    /// Get the authorization URL for the user to visit
    pub fn get_auth_url(instance: &str, client_id: &str) -> String {
        format!(
            "{}/oauth/authorize?client_id={}&redirect_uri={}&response_type=code&scope={}",
            instance.trim_end_matches('/'),
            urlencoding::encode(client_id),
            urlencoding::encode(REDIRECT_URI),
            urlencoding::encode(SCOPES),
        )
    }

    /// Exchange authorization code for a user access token
    pub async fn get_token(
        instance: &str,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<OAuthToken> {
        request_token(
            instance,
            &[
                ("grant_type", "authorization_code"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", REDIRECT_URI),
                ("code", code),
                ("scope", SCOPES),
            ],
        )
        .await
    }

    /// Get an app-level access token (client credentials grant)
    pub async fn get_app_token(
        instance: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<OAuthToken> {
        request_token(
            instance,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", REDIRECT_URI),
                ("scope", "read"),
            ],
        )
        .await
    }

    async fn request_token(instance: &str, params: &[(&str, &str)]) -> Result<OAuthToken> {
        let client = Client::new();
        let url = format!("{}/oauth/token", instance.trim_end_matches('/'));

        let response = client
            .post(&url)
            .form(params)
            .send()
            .await
            .context("Failed to get access token")?;

        check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse token response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_max_id_from_link_header() {
        let link = r#"<https://mastodon.social/api/v1/accounts/1/following?limit=80&max_id=4242>; rel="next", <https://mastodon.social/api/v1/accounts/1/following?limit=80&since_id=9000>; rel="prev""#;
        assert_eq!(next_max_id(link), Some(Cursor::new("4242")));
    }

    #[test]
    fn test_next_max_id_absent_without_next() {
        let link = r#"<https://mastodon.social/api/v1/blocks?since_id=12>; rel="prev""#;
        assert_eq!(next_max_id(link), None);
        assert_eq!(next_max_id(""), None);
    }

    #[test]
    fn test_with_query_encodes_values() {
        let url = "https://mastodon.social/api/v1/timelines/home";
        assert_eq!(with_query(url, &[]), url);
        assert_eq!(
            with_query(
                url,
                &[("limit", "20".to_string()), ("max_id", "a b&c".to_string())]
            ),
            "https://mastodon.social/api/v1/timelines/home?limit=20&max_id=a%20b%26c"
        );
        assert_eq!(
            with_query("https://x.example/api?local=true", &[("types[]", "mention".to_string())]),
            "https://x.example/api?local=true&types[]=mention"
        );
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(
            strip_html("<p>Hello &amp; <a href=\"x\">welcome</a></p><p>bye<br>now</p>"),
            "Hello & welcome\n\nbye\nnow"
        );
    }

    #[test]
    fn test_boost_keeps_entry_id() {
        let json = r#"{
            "id": "200", "created_at": "2024-05-01T10:00:00Z", "content": "", "url": null,
            "account": {"id": "9", "username": "booster", "display_name": "Booster", "acct": "booster"},
            "reblog": {
                "id": "100", "created_at": "2024-05-01T09:00:00Z", "content": "<p>original</p>",
                "url": "https://example.org/@a/100",
                "account": {"id": "1", "username": "author", "display_name": "", "acct": "author@example.org"},
                "reblog": null, "favourites_count": 3, "reblogs_count": 1, "replies_count": 0,
                "favourited": null, "reblogged": true, "in_reply_to_id": null
            },
            "favourites_count": 0, "reblogs_count": 0, "replies_count": 0,
            "favourited": null, "reblogged": null, "in_reply_to_id": null
        }"#;

        let status: MastodonStatus = serde_json::from_str(json).unwrap();
        let status = status.into_status();

        assert_eq!(status.id, "200");
        assert_eq!(status.reblog_of.as_deref(), Some("100"));
        assert_eq!(status.reblogged_by.as_deref(), Some("Booster"));
        assert_eq!(status.author_acct, "author@example.org");
        assert_eq!(status.author_name, "author");
        assert_eq!(status.content, "original");
    }

    #[test]
    fn test_notification_mapping() {
        let json = r#"{
            "id": "77", "type": "follow_request", "created_at": "2024-05-01T10:00:00Z",
            "account": {"id": "5", "username": "carol", "display_name": "Carol", "acct": "carol"},
            "status": null
        }"#;

        let notification: MastodonNotification = serde_json::from_str(json).unwrap();
        let notification = notification.into_notification();
        assert_eq!(notification.kind, NotificationType::FollowRequest);
        assert_eq!(notification.account.display_name, "Carol");
        assert!(notification.status.is_none());
    }
}
