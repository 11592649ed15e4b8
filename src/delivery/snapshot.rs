//! Content snapshot sources for the polling fallback: fetch the current
//! post list from each platform's Graph API and map it into one shape.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SnapshotConfig;

/// One published post as seen through a snapshot fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub platform: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub link: Option<String>,
}

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Current full post snapshot, newest data the source will give us.
    async fn fetch_posts(&self) -> Result<Vec<Post>>;
    fn name(&self) -> &'static str;
}

/// Graph-style timestamps come in a few close-but-different flavors
/// (`+00:00`, `+0000`). Unparseable times fall back to the epoch, which
/// never qualifies against a recency window.
fn parse_graph_time(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .or_else(|_| DateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

pub struct InstagramMedia {
    token: String,
    client: reqwest::Client,
}

impl InstagramMedia {
    pub fn new(token: String) -> Self {
        Self {
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstagramFeed {
    #[serde(default)]
    data: Vec<InstagramItem>,
}

#[derive(Debug, Deserialize)]
struct InstagramItem {
    id: String,
    caption: Option<String>,
    permalink: Option<String>,
    timestamp: Option<String>,
}

#[async_trait]
impl SnapshotSource for InstagramMedia {
    async fn fetch_posts(&self) -> Result<Vec<Post>> {
        let url = format!(
            "https://graph.instagram.com/me/media\
             ?fields=id,caption,media_type,media_url,permalink,timestamp\
             &access_token={}",
            self.token
        );
        let feed: InstagramFeed = self
            .client
            .get(url)
            .send()
            .await
            .context("instagram media get")?
            .error_for_status()
            .context("instagram media non-2xx")?
            .json()
            .await
            .context("instagram media json")?;

        Ok(feed
            .data
            .into_iter()
            .map(|item| Post {
                id: format!("instagram_{}", item.id),
                platform: "instagram".to_string(),
                content: item.caption.unwrap_or_default(),
                timestamp: item.timestamp.as_deref().map(parse_graph_time).unwrap_or_default(),
                link: item.permalink,
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "instagram"
    }
}

pub struct FacebookPage {
    page: String,
    token: String,
    client: reqwest::Client,
}

impl FacebookPage {
    pub fn new(page: String, token: String) -> Self {
        Self {
            page,
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FacebookFeed {
    #[serde(default)]
    data: Vec<FacebookItem>,
}

#[derive(Debug, Deserialize)]
struct FacebookItem {
    id: String,
    message: Option<String>,
    created_time: Option<String>,
    permalink_url: Option<String>,
}

#[async_trait]
impl SnapshotSource for FacebookPage {
    async fn fetch_posts(&self) -> Result<Vec<Post>> {
        let url = format!(
            "https://graph.facebook.com/v18.0/{}/posts\
             ?fields=id,message,created_time,permalink_url\
             &access_token={}",
            self.page, self.token
        );
        let feed: FacebookFeed = self
            .client
            .get(url)
            .send()
            .await
            .context("facebook posts get")?
            .error_for_status()
            .context("facebook posts non-2xx")?
            .json()
            .await
            .context("facebook posts json")?;

        Ok(feed
            .data
            .into_iter()
            .map(|item| Post {
                id: format!("facebook_{}", item.id),
                platform: "facebook".to_string(),
                content: item.message.unwrap_or_default(),
                timestamp: item
                    .created_time
                    .as_deref()
                    .map(parse_graph_time)
                    .unwrap_or_default(),
                link: item.permalink_url,
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "facebook"
    }
}

pub struct LinkedinOrganization {
    org: String,
    token: String,
    client: reqwest::Client,
}

impl LinkedinOrganization {
    pub fn new(org: String, token: String) -> Self {
        Self {
            org,
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LinkedinFeed {
    #[serde(default)]
    elements: Vec<LinkedinItem>,
}

#[derive(Debug, Deserialize)]
struct LinkedinItem {
    id: String,
    created: Option<LinkedinAudit>,
}

#[derive(Debug, Deserialize)]
struct LinkedinAudit {
    /// Milliseconds since the epoch.
    time: i64,
}

#[async_trait]
impl SnapshotSource for LinkedinOrganization {
    async fn fetch_posts(&self) -> Result<Vec<Post>> {
        let url = format!(
            "https://api.linkedin.com/v2/ugcPosts\
             ?q=authors&authors=List(urn:li:organization:{})&count=10",
            self.org
        );
        let feed: LinkedinFeed = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .send()
            .await
            .context("linkedin ugc get")?
            .error_for_status()
            .context("linkedin ugc non-2xx")?
            .json()
            .await
            .context("linkedin ugc json")?;

        Ok(feed
            .elements
            .into_iter()
            .map(|item| Post {
                id: format!("linkedin_{}", item.id),
                platform: "linkedin".to_string(),
                content: String::new(),
                timestamp: item
                    .created
                    .map(|c| DateTime::from_timestamp_millis(c.time).unwrap_or_default())
                    .unwrap_or_default(),
                link: None,
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "linkedin"
    }
}

/// Merges whatever platform sources are configured. A single platform
/// failing is logged and skipped; the fetch errors only when every
/// configured source fails, so one broken credential does not poison the
/// whole polling session.
pub struct CombinedSnapshot {
    sources: Vec<Box<dyn SnapshotSource>>,
}

impl CombinedSnapshot {
    pub fn new(sources: Vec<Box<dyn SnapshotSource>>) -> Self {
        Self { sources }
    }

    pub fn from_env(config: &SnapshotConfig) -> Self {
        let mut sources: Vec<Box<dyn SnapshotSource>> = Vec::new();
        if let Some(token) = &config.instagram_token {
            sources.push(Box::new(InstagramMedia::new(token.clone())));
        }
        if let (Some(page), Some(token)) = (&config.facebook_page, &config.facebook_token) {
            sources.push(Box::new(FacebookPage::new(page.clone(), token.clone())));
        }
        if let (Some(org), Some(token)) = (&config.linkedin_org, &config.linkedin_token) {
            sources.push(Box::new(LinkedinOrganization::new(org.clone(), token.clone())));
        }
        if sources.is_empty() {
            tracing::warn!("no content-source credentials configured, snapshots will be empty");
        }
        Self { sources }
    }
}

#[async_trait]
impl SnapshotSource for CombinedSnapshot {
    async fn fetch_posts(&self) -> Result<Vec<Post>> {
        if self.sources.is_empty() {
            return Ok(Vec::new());
        }

        let mut posts = Vec::new();
        let mut failures = 0usize;
        for source in &self.sources {
            match source.fetch_posts().await {
                Ok(mut batch) => posts.append(&mut batch),
                Err(err) => {
                    failures += 1;
                    tracing::warn!(source = source.name(), error = %format!("{err:#}"), "snapshot source failed");
                }
            }
        }

        if failures == self.sources.len() {
            anyhow::bail!("all {failures} snapshot sources failed");
        }
        Ok(posts)
    }

    fn name(&self) -> &'static str {
        "combined"
    }
}
