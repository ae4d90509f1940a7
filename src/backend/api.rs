use super::model::{DeleteOutcome, EngagementStatus, Envelope, FeedItem, FeedPage};
use crate::config::ApiConfig;
use regex::Regex;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Http(reqwest::Error),
    /// The transport gave up because the request was aborted or cancelled.
    #[error("request aborted: {0}")]
    Aborted(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;

static RE_CANCELLATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)abort|cancel|signal").expect("invalid regex"));

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let message = e.to_string();
        if RE_CANCELLATION.is_match(&message) {
            Error::Aborted(message)
        } else {
            Error::Http(e)
        }
    }
}

impl Error {
    /// Aborted or cancelled requests are not reported to the user. Server
    /// responses never count, whatever their body says.
    pub fn is_benign_cancellation(&self) -> bool {
        matches!(self, Error::Aborted(_))
    }
}

/// Parameters of one feed request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedQuery {
    pub limit: usize,
    pub mode: Option<String>,
    pub generation_type: Option<String>,
    pub search: Option<String>,
    pub cursor: Option<String>,
}

impl FeedQuery {
    pub const SORT_BY: &'static str = "aestheticScore";
    pub const SORT_ORDER: &'static str = "desc";

    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("limit", self.limit.to_string()),
            ("sortBy", Self::SORT_BY.to_string()),
            ("sortOrder", Self::SORT_ORDER.to_string()),
            ("tiebreak", "createdAt".to_string()),
        ];
        if let Some(mode) = &self.mode {
            pairs.push(("mode", mode.clone()));
        }
        if let Some(generation_type) = &self.generation_type {
            pairs.push(("generationType", generation_type.clone()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        if let Some(cursor) = &self.cursor {
            pairs.push(("cursor", cursor.clone()));
        }
        pairs
    }
}

/// The backend the gallery talks to.
pub trait GalleryApi: Send + Sync + 'static {
    fn fetch_feed(&self, query: &FeedQuery) -> impl Future<Output = Result<FeedPage>> + Send;
    fn fetch_item(&self, id: &str) -> impl Future<Output = Result<FeedItem>> + Send;
    fn set_like(&self, id: &str, liked: bool) -> impl Future<Output = Result<()>> + Send;
    fn set_bookmark(&self, id: &str, bookmarked: bool) -> impl Future<Output = Result<()>> + Send;
    fn engagement_status(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<EngagementStatus>>> + Send;
    fn delete(
        &self,
        id: &str,
        media_id: Option<&str>,
    ) -> impl Future<Output = Result<DeleteOutcome>> + Send;
}

/// `GalleryApi` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpApi {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout))
            .build()?;
        // Relative joins drop the last segment unless the base ends with a slash.
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            http,
            base_url: Url::parse(&base)?,
        })
    }
    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        Ok(self.http.request(method, self.base_url.join(path)?))
    }
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Status { status, body });
        }
        Ok(serde_json::from_str(if body.trim().is_empty() {
            "null"
        } else {
            &body
        })?)
    }
}

fn encode(segment: &str) -> String {
    percent_encoding::utf8_percent_encode(segment, percent_encoding::NON_ALPHANUMERIC).to_string()
}

impl GalleryApi for HttpApi {
    async fn fetch_feed(&self, query: &FeedQuery) -> Result<FeedPage> {
        log::debug!("GET feed {:?}", query);
        let builder = self.request(Method::GET, "feed")?.query(&query.pairs());
        let mut page = self.send::<Envelope<FeedPage>>(builder).await?.into_inner();
        page.items.iter_mut().for_each(FeedItem::normalize);
        Ok(page)
    }
    async fn fetch_item(&self, id: &str) -> Result<FeedItem> {
        let builder = self.request(Method::GET, &format!("feed/{}", encode(id)))?;
        let mut item = self.send::<Envelope<FeedItem>>(builder).await?.into_inner();
        item.normalize();
        Ok(item)
    }
    async fn set_like(&self, id: &str, liked: bool) -> Result<()> {
        let action = if liked { "like" } else { "unlike" };
        let builder = self
            .request(Method::POST, &format!("engagement/{action}"))?
            .json(&json!({ "generationId": id }));
        self.send::<serde_json::Value>(builder).await.map(|_| ())
    }
    async fn set_bookmark(&self, id: &str, bookmarked: bool) -> Result<()> {
        let action = if bookmarked { "save" } else { "unsave" };
        let builder = self
            .request(Method::POST, &format!("engagement/{action}"))?
            .json(&json!({ "generationId": id }));
        self.send::<serde_json::Value>(builder).await.map(|_| ())
    }
    async fn engagement_status(&self, ids: &[String]) -> Result<Vec<EngagementStatus>> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Statuses {
            List(Vec<EngagementStatus>),
            Keyed { items: Vec<EngagementStatus> },
        }

        let builder = self
            .request(Method::POST, "engagement/status")?
            .json(&json!({ "generationIds": ids }));
        Ok(match self.send::<Envelope<Statuses>>(builder).await?.into_inner() {
            Statuses::List(list) => list,
            Statuses::Keyed { items } => items,
        })
    }
    async fn delete(&self, id: &str, media_id: Option<&str>) -> Result<DeleteOutcome> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Deleted {
            #[serde(default)]
            item: Option<FeedItem>,
        }

        let path = match media_id {
            Some(media_id) => format!("generations/{}/media/{}", encode(id), encode(media_id)),
            None => format!("generations/{}", encode(id)),
        };
        let builder = self.request(Method::DELETE, &path)?;
        let deleted = self
            .send::<Option<Envelope<Deleted>>>(builder)
            .await?
            .map(Envelope::into_inner);
        Ok(match deleted.and_then(|d| d.item) {
            Some(mut item) => {
                item.normalize();
                DeleteOutcome::Updated(item)
            }
            None => DeleteOutcome::Deleted,
        })
    }
}
