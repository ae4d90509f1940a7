use super::api::{self, FeedQuery};
use super::model::{DeleteOutcome, FeedItem, FeedPage};
use crate::types::{Category, CategoryFilter};
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// The user-controlled filters a request was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filters {
    pub category: Category,
    pub search: String,
}

/// A pending request intent. A queued reset is never downgraded to a continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intent {
    pub reset: bool,
}

/// A request that has been issued and must be settled with [`Coordinator::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    seq: u64,
    epoch: u64,
    reset: bool,
    filters: Filters,
    query: FeedQuery,
}

impl Ticket {
    pub fn seq(&self) -> u64 {
        self.seq
    }
    pub fn is_reset(&self) -> bool {
        self.reset
    }
    pub fn query(&self) -> &FeedQuery {
        &self.query
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The page was merged. `retry` asks for the single retry of an empty reset.
    Applied { fetched: usize, retry: bool },
    /// Superseded by a newer request or a filter change. Nothing changed.
    Stale,
    /// The request failed; the message is surfaced and pagination stops.
    Failed(String),
    /// The request was aborted. Nothing is reported.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub outcome: Outcome,
    /// An intent that arrived while the request was in flight; run it on the next tick.
    pub replay: Option<Intent>,
}

/// What the gallery renders from, published after every change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedSnapshot {
    pub items: Vec<FeedItem>,
    pub filters: Filters,
    pub has_more: bool,
    pub loading: bool,
    pub initial_loaded: bool,
    pub error: Option<String>,
}

/// Pagination and sequencing state of one feed.
///
/// At most one request is in flight. Responses are applied in intent order: a
/// response is dropped when a newer request was issued or the filters were
/// reset since it started. Only the newly fetched page of a continuation is
/// shuffled, so items already in the list never move.
pub struct Coordinator<R = StdRng> {
    limit: usize,
    seq: u64,
    epoch: u64,
    filters: Filters,
    cursor: Option<String>,
    has_more: bool,
    in_flight: Option<u64>,
    queued: Option<Intent>,
    initial_loaded: bool,
    retried: bool,
    error: Option<String>,
    items: IndexMap<String, FeedItem>,
    rng: R,
}

impl Coordinator<StdRng> {
    pub fn new(limit: usize) -> Self {
        Self::with_rng(limit, StdRng::from_entropy())
    }
}

impl<R> Coordinator<R>
where
    R: Rng,
{
    pub fn with_rng(limit: usize, rng: R) -> Self {
        Self {
            limit: limit.max(1),
            seq: 0,
            epoch: 0,
            filters: Filters::default(),
            cursor: None,
            has_more: false,
            in_flight: None,
            queued: None,
            initial_loaded: false,
            retried: false,
            error: None,
            items: IndexMap::new(),
            rng,
        }
    }
    pub fn filters(&self) -> &Filters {
        &self.filters
    }
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }
    pub fn has_more(&self) -> bool {
        self.has_more
    }
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }
    pub fn initial_loaded(&self) -> bool {
        self.initial_loaded
    }
    /// Incremented on every reset; identifies the current reset cycle.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
    pub fn items(&self) -> impl Iterator<Item = &FeedItem> {
        self.items.values()
    }
    pub fn get(&self, id: &str) -> Option<&FeedItem> {
        self.items.get(id)
    }
    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            items: self.items.values().cloned().collect(),
            filters: self.filters.clone(),
            has_more: self.has_more,
            loading: self.is_loading(),
            initial_loaded: self.initial_loaded,
            error: self.error.clone(),
        }
    }

    /// Ask for the first page (`reset`) or the next one. Returns the request to
    /// issue, or `None` when it was coalesced behind the in-flight request or
    /// there is nothing more to load.
    pub fn request_page(&mut self, reset: bool) -> Option<Ticket> {
        if self.in_flight.is_some() {
            let reset = reset || self.queued.is_some_and(|q| q.reset);
            log::debug!("request coalesced (reset: {reset})");
            self.queued = Some(Intent { reset });
            return None;
        }
        if !reset && !self.has_more {
            log::debug!("no more pages");
            return None;
        }
        self.seq += 1;
        self.in_flight = Some(self.seq);
        let (mode, generation_type) = match self.filters.category.query_filter() {
            Some(CategoryFilter::Mode(mode)) => (Some(mode.to_string()), None),
            Some(CategoryFilter::GenerationType(t)) => (None, Some(t.to_string())),
            None => (None, None),
        };
        let search = self.filters.search.trim();
        let ticket = Ticket {
            seq: self.seq,
            epoch: self.epoch,
            reset,
            filters: self.filters.clone(),
            query: FeedQuery {
                limit: self.limit,
                mode,
                generation_type,
                search: (!search.is_empty()).then(|| search.to_string()),
                cursor: if reset { None } else { self.cursor.clone() },
            },
        };
        log::debug!("request #{} {:?}", ticket.seq, ticket.query);
        Some(ticket)
    }
    /// The single retry of a reset that came back empty, if still relevant.
    pub fn retry(&mut self, epoch: u64) -> Option<Ticket> {
        if epoch != self.epoch || !self.items.is_empty() {
            return None;
        }
        self.request_page(true)
    }
    pub fn set_category(&mut self, category: Category) -> Option<Ticket> {
        if self.filters.category == category {
            return None;
        }
        log::info!("category: {} -> {category}", self.filters.category);
        self.filters.category = category;
        self.reset_state();
        self.request_page(true)
    }
    pub fn set_search(&mut self, search: &str) -> Option<Ticket> {
        if self.filters.search == search {
            return None;
        }
        log::info!("search: {:?} -> {search:?}", self.filters.search);
        self.filters.search = search.to_string();
        self.reset_state();
        self.request_page(true)
    }
    /// Reload from the first page with the current filters.
    pub fn refresh(&mut self) -> Option<Ticket> {
        self.reset_state();
        self.request_page(true)
    }
    fn reset_state(&mut self) {
        self.epoch += 1;
        self.items.clear();
        self.cursor = None;
        self.has_more = false;
        self.initial_loaded = false;
        self.retried = false;
        self.error = None;
    }

    /// Settle an issued request with its result.
    pub fn complete(&mut self, ticket: &Ticket, result: api::Result<FeedPage>) -> Settlement {
        let outcome = if ticket.seq != self.seq
            || ticket.epoch != self.epoch
            || ticket.filters != self.filters
        {
            log::debug!("drop stale response #{}", ticket.seq);
            Outcome::Stale
        } else {
            match result {
                Ok(page) => self.accept(ticket, page),
                Err(e) => {
                    let message = e.to_string();
                    if e.is_benign_cancellation() {
                        log::debug!("request #{} cancelled: {message}", ticket.seq);
                        Outcome::Cancelled
                    } else {
                        log::warn!("failed to fetch feed: {message}");
                        self.has_more = false;
                        self.error = Some(message.clone());
                        Outcome::Failed(message)
                    }
                }
            }
        };

        let mut replay = None;
        if self.in_flight == Some(ticket.seq) {
            self.in_flight = None;
            replay = self.queued.take();
            if ticket.epoch == self.epoch {
                self.initial_loaded = true;
            }
        }
        Settlement { outcome, replay }
    }
    fn accept(&mut self, ticket: &Ticket, page: FeedPage) -> Outcome {
        let FeedPage {
            items: mut fetched,
            next_cursor,
            has_more,
        } = page;
        // Paging follows what the server sent, before records without an id are dropped.
        let returned = fetched.len();
        fetched.retain(|item| !item.id.is_empty());
        fetched.iter_mut().for_each(FeedItem::normalize);
        let count = fetched.len();
        if ticket.reset {
            self.items.clear();
        } else {
            fetched.shuffle(&mut self.rng);
        }
        for item in fetched {
            self.items.insert(item.id.clone(), item);
        }
        self.has_more = has_more.unwrap_or(returned >= self.limit && next_cursor.is_some());
        self.cursor = next_cursor;
        self.error = None;
        let retry = ticket.reset && count == 0 && !self.retried;
        if retry {
            self.retried = true;
        }
        log::info!(
            "applied #{}: {count} fetched, {} total, has_more: {}",
            ticket.seq,
            self.items.len(),
            self.has_more
        );
        Outcome::Applied {
            fetched: count,
            retry,
        }
    }

    /// Apply a confirmed delete. Nothing changes for ids not in the list.
    pub fn apply_delete(&mut self, id: &str, outcome: DeleteOutcome) {
        match outcome {
            DeleteOutcome::Deleted => {
                self.items.shift_remove(id);
            }
            DeleteOutcome::Updated(mut item) => {
                item.normalize();
                if let Some(slot) = self.items.get_mut(id) {
                    *slot = item;
                }
            }
        }
    }
}
