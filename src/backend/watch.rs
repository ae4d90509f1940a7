use super::config::Config;
use std::sync::Arc;
use tokio::sync::watch;

pub trait Watch {
    type Output;

    fn subscribe(&self) -> watch::Receiver<Self::Output>;
    fn unsubscribe(&self);
    fn refresh(&self);
}

pub struct Watcher<A> {
    pub api: Arc<A>,
    pub(crate) config: Config,
}

impl<A> Watcher<A> {
    pub fn new(api: Arc<A>, config: Config) -> Self {
        Self { api, config }
    }
}
