use super::api::{Error, FeedQuery, GalleryApi, Result};
use super::engagement::Reaction;
use super::model::{DeleteOutcome, EngagementStatus, FeedItem, FeedPage};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory backend for tests. Pages are keyed by search text and cursor.
#[derive(Default)]
pub(crate) struct MockApi {
    pages: Mutex<HashMap<(String, Option<String>), FeedPage>>,
    delays: Mutex<HashMap<String, Duration>>,
    queries: Mutex<Vec<FeedQuery>>,
    items: Mutex<HashMap<String, FeedItem>>,
    statuses: Mutex<Vec<EngagementStatus>>,
    status_calls: Mutex<Vec<Vec<String>>>,
    reactions: Mutex<Vec<(String, Reaction, bool)>>,
    pub fail_reactions: AtomicBool,
    pub fail_feed: AtomicBool,
}

fn failure() -> Error {
    Error::Status {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: String::from("boom"),
    }
}

impl MockApi {
    pub fn set_page(&self, search: &str, cursor: Option<&str>, page: FeedPage) {
        self.pages
            .lock()
            .unwrap()
            .insert((search.to_string(), cursor.map(String::from)), page);
    }
    pub fn set_delay(&self, search: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(search.to_string(), delay);
    }
    pub fn set_item(&self, item: FeedItem) {
        self.items.lock().unwrap().insert(item.id.clone(), item);
    }
    pub fn set_statuses(&self, statuses: Vec<EngagementStatus>) {
        *self.statuses.lock().unwrap() = statuses;
    }
    pub fn queries(&self) -> Vec<FeedQuery> {
        self.queries.lock().unwrap().clone()
    }
    pub fn status_calls(&self) -> Vec<Vec<String>> {
        self.status_calls.lock().unwrap().clone()
    }
    pub fn reactions(&self) -> Vec<(String, Reaction, bool)> {
        self.reactions.lock().unwrap().clone()
    }
    fn react(&self, id: &str, reaction: Reaction, value: bool) -> Result<()> {
        self.reactions
            .lock()
            .unwrap()
            .push((id.to_string(), reaction, value));
        if self.fail_reactions.load(Ordering::SeqCst) {
            Err(failure())
        } else {
            Ok(())
        }
    }
}

impl GalleryApi for MockApi {
    async fn fetch_feed(&self, query: &FeedQuery) -> Result<FeedPage> {
        let search = query.search.clone().unwrap_or_default();
        self.queries.lock().unwrap().push(query.clone());
        let delay = self.delays.lock().unwrap().get(&search).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_feed.load(Ordering::SeqCst) {
            return Err(failure());
        }
        let page = self
            .pages
            .lock()
            .unwrap()
            .get(&(search, query.cursor.clone()))
            .cloned();
        Ok(page.unwrap_or_default())
    }
    async fn fetch_item(&self, id: &str) -> Result<FeedItem> {
        let item = self.items.lock().unwrap().get(id).cloned();
        item.ok_or_else(|| Error::Status {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        })
    }
    async fn set_like(&self, id: &str, liked: bool) -> Result<()> {
        self.react(id, Reaction::Like, liked)
    }
    async fn set_bookmark(&self, id: &str, bookmarked: bool) -> Result<()> {
        self.react(id, Reaction::Bookmark, bookmarked)
    }
    async fn engagement_status(&self, ids: &[String]) -> Result<Vec<EngagementStatus>> {
        self.status_calls.lock().unwrap().push(ids.to_vec());
        let statuses = self.statuses.lock().unwrap().clone();
        Ok(statuses
            .into_iter()
            .filter(|s| ids.contains(&s.id))
            .collect())
    }
    async fn delete(&self, id: &str, media_id: Option<&str>) -> Result<DeleteOutcome> {
        let mut items = self.items.lock().unwrap();
        let Some(item) = items.get_mut(id) else {
            return Err(failure());
        };
        Ok(match media_id {
            Some(media_id) => {
                item.images.retain(|m| m.id.as_deref() != Some(media_id));
                DeleteOutcome::Updated(item.clone())
            }
            None => {
                items.remove(id);
                DeleteOutcome::Deleted
            }
        })
    }
}
