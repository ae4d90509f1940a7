mod feed;

pub use feed::FeedWatcher;
