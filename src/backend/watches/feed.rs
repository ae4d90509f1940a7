use super::super::api::{self, GalleryApi};
use super::super::config::Config;
use super::super::coordinator::{Coordinator, FeedSnapshot, Intent, Outcome, Ticket};
use super::super::model::{DeleteOutcome, FeedItem, FeedPage};
use super::super::{Watch, Watcher};
use crate::types::Category;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::time::{self, Instant};

impl<A> Watcher<A>
where
    A: GalleryApi,
{
    /// Start a feed and issue its first page.
    pub fn feed(&self) -> FeedWatcher<A> {
        self.feed_with(Coordinator::new(self.config.page_size))
    }
    pub(crate) fn feed_with(&self, coordinator: Coordinator) -> FeedWatcher<A> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(coordinator.snapshot());
        let task = FeedTask {
            api: self.api.clone(),
            config: self.config.clone(),
            coordinator,
            snapshot: snapshot_tx,
        };
        tokio::spawn(task.run(rx));
        FeedWatcher {
            api: self.api.clone(),
            tx,
            rx: snapshot_rx,
        }
    }
}

#[derive(Debug)]
enum Command {
    Category(Category),
    Search(String),
    LoadMore,
    Refresh,
    Retry(u64),
    Replay(Intent),
    Deleted(String, DeleteOutcome),
    Quit,
}

/// Handle to a running feed. Dropping it stops the feed.
pub struct FeedWatcher<A> {
    api: Arc<A>,
    tx: UnboundedSender<Command>,
    rx: watch::Receiver<FeedSnapshot>,
}

impl<A> FeedWatcher<A>
where
    A: GalleryApi,
{
    fn send(&self, command: Command) {
        if let Err(e) = self.tx.send(command) {
            log::warn!("failed to send feed command: {e}");
        }
    }
    pub fn set_category(&self, category: Category) {
        self.send(Command::Category(category));
    }
    /// Update the search text. Applied after the debounce delay.
    pub fn set_search(&self, search: impl Into<String>) {
        self.send(Command::Search(search.into()));
    }
    /// Ask for the next page.
    pub fn load_more(&self) {
        self.send(Command::LoadMore);
    }
    pub fn snapshot(&self) -> FeedSnapshot {
        self.rx.borrow().clone()
    }
    /// Delete an item, or one media of it. The list only changes once the server
    /// confirms.
    pub async fn delete(&self, id: &str, media_id: Option<&str>) -> api::Result<()> {
        match self.api.delete(id, media_id).await {
            Ok(outcome) => {
                self.send(Command::Deleted(id.to_string(), outcome));
                Ok(())
            }
            Err(e) => {
                log::warn!("failed to delete {id}: {e}");
                Err(e)
            }
        }
    }
    /// Find an item for a deep link, fetching it when it is not loaded.
    pub async fn resolve_item(&self, id: &str) -> api::Result<FeedItem> {
        let loaded = self.rx.borrow().items.iter().find(|i| i.id == id).cloned();
        match loaded {
            Some(item) => Ok(item),
            None => self.api.fetch_item(id).await,
        }
    }
}

impl<A> Watch for FeedWatcher<A>
where
    A: GalleryApi,
{
    type Output = FeedSnapshot;

    fn subscribe(&self) -> watch::Receiver<Self::Output> {
        self.rx.clone()
    }
    fn unsubscribe(&self) {
        self.send(Command::Quit);
    }
    fn refresh(&self) {
        self.send(Command::Refresh);
    }
}

struct FeedTask<A> {
    api: Arc<A>,
    config: Config,
    coordinator: Coordinator,
    snapshot: watch::Sender<FeedSnapshot>,
}

impl<A> FeedTask<A>
where
    A: GalleryApi,
{
    async fn run(mut self, mut commands: UnboundedReceiver<Command>) {
        // Follow-up work (replays and retries) goes through its own channel so it
        // runs on a later turn of the loop.
        let (internal_tx, mut internal) = mpsc::unbounded_channel();
        let (done_tx, mut done) = mpsc::unbounded_channel::<(Ticket, api::Result<FeedPage>)>();
        let mut pending_search: Option<String> = None;
        let debounce = time::sleep(Duration::ZERO);
        tokio::pin!(debounce);

        let ticket = self.coordinator.request_page(true);
        self.issue(ticket, &done_tx);
        self.publish();
        loop {
            let command = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
                Some(command) = internal.recv() => command,
                () = &mut debounce, if pending_search.is_some() => {
                    if let Some(search) = pending_search.take() {
                        let ticket = self.coordinator.set_search(&search);
                        self.issue(ticket, &done_tx);
                        self.publish();
                    }
                    continue;
                }
                Some((ticket, result)) = done.recv() => {
                    self.settle(&ticket, result, &internal_tx);
                    self.publish();
                    continue;
                }
            };
            let ticket = match command {
                Command::Quit => break,
                Command::Search(search) => {
                    debounce
                        .as_mut()
                        .reset(Instant::now() + self.config.debounce.delay(&search));
                    pending_search = Some(search);
                    continue;
                }
                Command::Category(category) => self.coordinator.set_category(category),
                Command::LoadMore => self.coordinator.request_page(false),
                Command::Refresh => self.coordinator.refresh(),
                Command::Retry(epoch) => self.coordinator.retry(epoch),
                Command::Replay(intent) => self.coordinator.request_page(intent.reset),
                Command::Deleted(id, outcome) => {
                    self.coordinator.apply_delete(&id, outcome);
                    None
                }
            };
            self.issue(ticket, &done_tx);
            self.publish();
        }
        log::debug!("quit");
    }
    fn issue(
        &self,
        ticket: Option<Ticket>,
        done: &UnboundedSender<(Ticket, api::Result<FeedPage>)>,
    ) {
        let Some(ticket) = ticket else {
            return;
        };
        let (api, done) = (self.api.clone(), done.clone());
        tokio::spawn(async move {
            let result = api.fetch_feed(ticket.query()).await;
            if done.send((ticket, result)).is_err() {
                log::debug!("feed closed before the response arrived");
            }
        });
    }
    fn settle(
        &mut self,
        ticket: &Ticket,
        result: api::Result<FeedPage>,
        internal: &UnboundedSender<Command>,
    ) {
        let settlement = self.coordinator.complete(ticket, result);
        if let Outcome::Applied { retry: true, .. } = settlement.outcome {
            let (internal, epoch) = (internal.clone(), self.coordinator.epoch());
            let delay = Duration::from_millis(self.config.retry_delay);
            log::info!("empty first page, retrying in {delay:?}");
            tokio::spawn(async move {
                time::sleep(delay).await;
                internal.send(Command::Retry(epoch)).ok();
            });
        }
        if let Some(intent) = settlement.replay {
            internal.send(Command::Replay(intent)).ok();
        }
    }
    fn publish(&self) {
        let next = self.coordinator.snapshot();
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
