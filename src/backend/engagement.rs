use super::api::{self, GalleryApi};
use super::model::EngagementStatus;
use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Maximum number of ids per status request.
pub const STATUS_BATCH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reaction {
    Like,
    Bookmark,
}

/// What the UI shows for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngagementRecord {
    pub likes_count: u64,
    pub bookmarks_count: u64,
    pub liked_by_me: bool,
    pub bookmarked_by_me: bool,
}

/// A server-confirmed value plus the sum of unconfirmed local deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counter {
    committed: u64,
    committed_flag: bool,
    pending_delta: i64,
    flag: bool,
    in_flight: u32,
    /// Bumped whenever the server reports a count.
    merges: u64,
}

impl Counter {
    fn count(&self) -> u64 {
        (self.committed as i64 + self.pending_delta).max(0) as u64
    }
    fn merge(&mut self, count: Option<u64>, flag: Option<bool>) {
        if let Some(count) = count {
            self.committed = count;
            self.merges += 1;
        }
        if let Some(flag) = flag {
            self.committed_flag = flag;
            if self.in_flight == 0 {
                self.flag = flag;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Tracked {
    likes: Counter,
    bookmarks: Counter,
}

impl Tracked {
    fn counter(&mut self, reaction: Reaction) -> &mut Counter {
        match reaction {
            Reaction::Like => &mut self.likes,
            Reaction::Bookmark => &mut self.bookmarks,
        }
    }
    fn record(&self) -> EngagementRecord {
        EngagementRecord {
            likes_count: self.likes.count(),
            bookmarks_count: self.bookmarks.count(),
            liked_by_me: self.likes.flag,
            bookmarked_by_me: self.bookmarks.flag,
        }
    }
}

/// An optimistic toggle awaiting server confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub id: String,
    pub reaction: Reaction,
    /// The flag value sent to the server.
    pub target: bool,
    previous: bool,
    delta: i64,
    merges: u64,
}

#[derive(Debug, Default)]
pub struct EngagementStore {
    records: HashMap<String, Tracked>,
    liked: HashSet<String>,
}

impl EngagementStore {
    pub fn get(&self, id: &str) -> EngagementRecord {
        self.records
            .get(id)
            .map(Tracked::record)
            .unwrap_or_default()
    }
    /// Ids currently liked by the user, including unconfirmed likes.
    pub fn liked_ids(&self) -> &HashSet<String> {
        &self.liked
    }
    fn sync_liked(&mut self, id: &str) {
        if self.records.get(id).is_some_and(|t| t.likes.flag) {
            self.liked.insert(id.to_string());
        } else {
            self.liked.remove(id);
        }
    }
    /// Flip the flag and adjust the count by one, clamped at zero.
    pub fn toggle(&mut self, id: &str, reaction: Reaction) -> Mutation {
        let counter = self
            .records
            .entry(id.to_string())
            .or_default()
            .counter(reaction);
        let previous = counter.flag;
        let target = !previous;
        let delta = match (target, counter.count()) {
            (true, _) => 1,
            (false, 0) => 0,
            (false, _) => -1,
        };
        counter.flag = target;
        counter.pending_delta += delta;
        counter.in_flight += 1;
        let merges = counter.merges;
        self.sync_liked(id);
        Mutation {
            id: id.to_string(),
            reaction,
            target,
            previous,
            delta,
            merges,
        }
    }
    /// Confirm the mutation. A count reported after the toggle started already
    /// includes it, so the delta is only folded into counts older than that.
    pub fn commit(&mut self, mutation: &Mutation) {
        let Some(tracked) = self.records.get_mut(&mutation.id) else {
            return;
        };
        let counter = tracked.counter(mutation.reaction);
        counter.pending_delta -= mutation.delta;
        if counter.merges == mutation.merges {
            counter.committed = (counter.committed as i64 + mutation.delta).max(0) as u64;
        }
        counter.committed_flag = mutation.target;
        counter.in_flight = counter.in_flight.saturating_sub(1);
    }
    /// Undo the mutation's own delta. The flag reverts unless a later toggle moved it,
    /// to the server's value when one arrived in the meantime.
    pub fn rollback(&mut self, mutation: &Mutation) {
        let Some(tracked) = self.records.get_mut(&mutation.id) else {
            return;
        };
        let counter = tracked.counter(mutation.reaction);
        counter.pending_delta -= mutation.delta;
        counter.in_flight = counter.in_flight.saturating_sub(1);
        if counter.flag == mutation.target {
            counter.flag = if counter.merges == mutation.merges {
                mutation.previous
            } else {
                counter.committed_flag
            };
        }
        self.sync_liked(&mutation.id);
    }
    /// Fold authoritative values in, field by field. Unconfirmed deltas stay applied.
    pub fn merge(&mut self, statuses: &[EngagementStatus]) {
        for status in statuses {
            let tracked = self.records.entry(status.id.clone()).or_default();
            tracked
                .likes
                .merge(status.likes_count, status.liked_by_current_user);
            tracked
                .bookmarks
                .merge(status.bookmarks_count, status.bookmarked_by_current_user);
            self.sync_liked(&status.id);
        }
    }
}

/// Engagement state shared between the gallery and in-flight requests.
pub struct Engagement<A> {
    api: Arc<A>,
    store: Mutex<EngagementStore>,
    hydrated: Mutex<Option<(Option<String>, Vec<String>)>>,
}

impl<A> Engagement<A>
where
    A: GalleryApi,
{
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            store: Mutex::new(EngagementStore::default()),
            hydrated: Mutex::new(None),
        }
    }
    fn store(&self) -> MutexGuard<'_, EngagementStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn record(&self, id: &str) -> EngagementRecord {
        self.store().get(id)
    }
    pub fn liked_ids(&self) -> HashSet<String> {
        self.store().liked_ids().clone()
    }
    pub async fn toggle_like(&self, id: &str) -> EngagementRecord {
        self.toggle(id, Reaction::Like).await
    }
    pub async fn toggle_bookmark(&self, id: &str) -> EngagementRecord {
        self.toggle(id, Reaction::Bookmark).await
    }
    async fn toggle(&self, id: &str, reaction: Reaction) -> EngagementRecord {
        let mutation = self.store().toggle(id, reaction);
        let result = match reaction {
            Reaction::Like => self.api.set_like(id, mutation.target).await,
            Reaction::Bookmark => self.api.set_bookmark(id, mutation.target).await,
        };
        let mut store = self.store();
        match result {
            Ok(()) => {
                store.commit(&mutation);
                // The next hydration must not be skipped as a repeat.
                *self.hydrated.lock().unwrap_or_else(PoisonError::into_inner) = None;
            }
            Err(e) => {
                log::warn!("failed to {reaction:?} {id}: {e}");
                store.rollback(&mutation);
            }
        }
        store.get(id)
    }
    /// Fetch authoritative state for the first hundred distinct ids. Repeated calls
    /// for the same user and ids are skipped.
    pub async fn hydrate<'a>(
        &self,
        user: Option<&str>,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> api::Result<()> {
        let ids = ids
            .into_iter()
            .collect::<IndexSet<_>>()
            .into_iter()
            .take(STATUS_BATCH)
            .map(String::from)
            .collect::<Vec<_>>();
        if ids.is_empty() {
            return Ok(());
        }
        let key = (user.map(String::from), ids);
        {
            let mut hydrated = self.hydrated.lock().unwrap_or_else(PoisonError::into_inner);
            if hydrated.as_ref() == Some(&key) {
                return Ok(());
            }
            *hydrated = Some(key.clone());
        }
        let statuses = match self.api.engagement_status(&key.1).await {
            Ok(statuses) => statuses,
            Err(e) => {
                log::warn!("failed to hydrate engagement: {e}");
                *self.hydrated.lock().unwrap_or_else(PoisonError::into_inner) = None;
                return Err(e);
            }
        };
        log::debug!("hydrated {} engagement records", statuses.len());
        self.store().merge(&statuses);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockApi;
    use std::sync::atomic::Ordering;

    fn status(id: &str, likes: u64, liked: bool) -> EngagementStatus {
        EngagementStatus {
            id: id.into(),
            likes_count: Some(likes),
            liked_by_current_user: Some(liked),
            ..Default::default()
        }
    }

    #[test]
    fn rollback_symmetry() {
        let mut store = EngagementStore::default();
        store.merge(&[status("a", 5, false)]);
        let before = store.get("a");
        let mutation = store.toggle("a", Reaction::Like);
        assert_eq!(store.get("a").likes_count, 6);
        assert!(store.get("a").liked_by_me);
        assert!(store.liked_ids().contains("a"));
        store.rollback(&mutation);
        assert_eq!(store.get("a"), before);
        assert!(!store.liked_ids().contains("a"));
    }

    #[test]
    fn clamped_at_zero() {
        let mut store = EngagementStore::default();
        store.merge(&[status("a", 0, true)]);
        let mutation = store.toggle("a", Reaction::Like);
        assert_eq!(store.get("a").likes_count, 0);
        assert!(!store.get("a").liked_by_me);
        store.rollback(&mutation);
        assert_eq!(store.get("a").likes_count, 0);
        assert!(store.get("a").liked_by_me);
    }

    #[test]
    fn racing_toggles() {
        let mut store = EngagementStore::default();
        store.merge(&[status("a", 3, false)]);
        let like = store.toggle("a", Reaction::Like);
        let unlike = store.toggle("a", Reaction::Like);
        assert_eq!(store.get("a").likes_count, 3);
        store.commit(&like);
        store.rollback(&unlike);
        assert_eq!(
            store.get("a"),
            EngagementRecord {
                likes_count: 4,
                liked_by_me: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn merge_keeps_pending_updates() {
        let mut store = EngagementStore::default();
        let mutation = store.toggle("a", Reaction::Bookmark);
        store.merge(&[status("a", 10, true)]);
        let record = store.get("a");
        assert_eq!(record.likes_count, 10);
        assert!(record.liked_by_me);
        assert_eq!(record.bookmarks_count, 1);
        assert!(record.bookmarked_by_me);
        store.commit(&mutation);
        assert_eq!(store.get("a").bookmarks_count, 1);
    }

    #[test]
    fn hydration_during_toggle_is_not_double_counted() {
        let mut store = EngagementStore::default();
        store.merge(&[status("a", 5, false)]);
        let mutation = store.toggle("a", Reaction::Like);
        // The server already counts the like when the status arrives.
        store.merge(&[status("a", 6, true)]);
        store.commit(&mutation);
        assert_eq!(
            store.get("a"),
            EngagementRecord {
                likes_count: 6,
                liked_by_me: true,
                ..Default::default()
            }
        );

        let mutation = store.toggle("a", Reaction::Like);
        store.merge(&[status("a", 5, false)]);
        store.rollback(&mutation);
        assert_eq!(store.get("a").likes_count, 5);
        assert!(!store.get("a").liked_by_me);
    }

    #[tokio::test]
    async fn commit_allows_rehydration() {
        let api = Arc::new(MockApi::default());
        api.set_statuses(vec![status("a", 5, false)]);
        let engagement = Engagement::new(api.clone());
        engagement.hydrate(None, ["a"]).await.expect("hydrated");
        engagement.hydrate(None, ["a"]).await.expect("hydrated");
        assert_eq!(api.status_calls().len(), 1);
        engagement.toggle_like("a").await;
        api.set_statuses(vec![status("a", 6, true)]);
        engagement.hydrate(None, ["a"]).await.expect("hydrated");
        assert_eq!(api.status_calls().len(), 2);
        assert_eq!(engagement.record("a").likes_count, 6);
    }

    #[tokio::test]
    async fn toggle_failure_rolls_back() {
        let api = Arc::new(MockApi::default());
        let engagement = Engagement::new(api.clone());
        let record = engagement.toggle_like("a").await;
        assert_eq!(record.likes_count, 1);
        assert!(engagement.liked_ids().contains("a"));

        api.fail_reactions.store(true, Ordering::SeqCst);
        let record = engagement.toggle_bookmark("a").await;
        assert_eq!(record.bookmarks_count, 0);
        assert!(!record.bookmarked_by_me);
        assert_eq!(
            api.reactions(),
            vec![
                ("a".to_string(), Reaction::Like, true),
                ("a".to_string(), Reaction::Bookmark, true)
            ]
        );
    }

    #[tokio::test]
    async fn hydrate_batches_distinct_ids() {
        let api = Arc::new(MockApi::default());
        api.set_statuses(vec![status("id3", 9, true)]);
        let engagement = Engagement::new(api.clone());
        let ids = (0..150)
            .map(|i| format!("id{}", i % 120))
            .collect::<Vec<_>>();
        engagement
            .hydrate(Some("u1"), ids.iter().map(String::as_str))
            .await
            .expect("hydrated");
        engagement
            .hydrate(Some("u1"), ids.iter().map(String::as_str))
            .await
            .expect("hydrated");
        engagement
            .hydrate(Some("u2"), ids.iter().map(String::as_str))
            .await
            .expect("hydrated");
        let calls = api.status_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].len(), STATUS_BATCH);
        assert_eq!(calls[0][0], "id0");
        assert_eq!(calls[0][99], "id99");
        assert_eq!(engagement.record("id3").likes_count, 9);
        assert!(engagement.liked_ids().contains("id3"));
    }
}
