use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use gallery_feed::backend::coordinator::FeedSnapshot;
use gallery_feed::backend::engagement::Engagement;
use gallery_feed::backend::{HttpApi, Watch, Watcher};
use gallery_feed::config::Config;
use gallery_feed::gallery::cards::{CardFilter, Projector};
use gallery_feed::gallery::media::MediaResolver;
use gallery_feed::gallery::Gallery;
use gallery_feed::layout::masonry::MasonryLayout;
use gallery_feed::layout::reveal::{LoadGate, RevealTracker, ScrollMetrics};
use gallery_feed::layout::Observer;
use gallery_feed::types::{Category, TileId};
use gallery_feed::utils::{get_config_dir, initialize_panic_handler};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{env, fs};
use tokio::sync::watch;
use tokio::time;

const COLUMN_WIDTH: f64 = 280.0;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
/// Headless client for a public generation gallery feed.
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Category to browse.
    #[arg(long)]
    category: Option<Category>,
    /// Free-text search.
    #[arg(short, long)]
    search: Option<String>,
    /// Number of pages to load by scrolling.
    #[arg(short, long, default_value_t = 1)]
    pages: usize,
    /// Base URL of the API, overriding the configuration file.
    #[arg(long)]
    api_base: Option<String>,
}

impl Args {
    fn config_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.config {
            Ok(path.clone())
        } else {
            Self::default_config_path()
        }
    }
    fn default_config_path() -> Result<PathBuf> {
        let config_dir = get_config_dir()?;
        fs::create_dir_all(&config_dir)?;
        Ok(config_dir.join("gallery-feed.config.toml"))
    }
}

fn init_logger() {
    let mut builder = env_logger::Builder::from_default_env();
    if env::var("RUST_LOG").is_err() {
        builder.filter_level(log::LevelFilter::Off);
    }
    builder.init();
}

/// Element observer for a renderer that measures nothing.
struct Headless;

impl Observer for Headless {
    fn observe(&mut self, tile: &TileId) {
        log::trace!("observe {tile}");
    }
    fn unobserve(&mut self, tile: &TileId) {
        log::trace!("unobserve {tile}");
    }
}

/// Wait until the page for `search` has been applied and nothing is in flight.
async fn settled(rx: &mut watch::Receiver<FeedSnapshot>, search: &str) -> Result<FeedSnapshot> {
    let snapshot = rx
        .wait_for(|s| s.initial_loaded && !s.loading && s.filters.search == search)
        .await
        .map_err(|_| eyre!("feed stopped"))?
        .clone();
    Ok(snapshot)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config: Config = if args.config_path()?.exists() {
        toml::from_str(&fs::read_to_string(args.config_path()?)?)?
    } else {
        Config::default()
    };
    if let Some(api_base) = args.api_base {
        config.api.base_url = api_base;
    }

    init_logger();

    initialize_panic_handler()?;

    let api = Arc::new(HttpApi::new(&config.api)?);
    let feed = Watcher::new(api.clone(), config.feed.clone()).feed();
    if let Some(category) = args.category {
        feed.set_category(category);
    }
    if let Some(search) = &args.search {
        feed.set_search(search.clone());
    }
    let search = args.search.unwrap_or_default();
    let mut rx = feed.subscribe();
    let mut snapshot = settled(&mut rx, &search).await?;

    let cooldown = Duration::from_millis(config.feed.load_more_cooldown);
    let mut reveal = RevealTracker::new(&config.layout, cooldown);
    for _ in 1..args.pages {
        // Jump to the bottom of the rendered page.
        let metrics = ScrollMetrics {
            scroll_top: 1.0,
            viewport_height: 0.0,
            document_height: 1.0,
        };
        if !reveal.on_scroll(metrics, LoadGate::from(&snapshot), Instant::now()) {
            break;
        }
        feed.load_more();
        rx.changed().await?;
        snapshot = settled(&mut rx, &search).await?;
        time::sleep(cooldown).await;
    }
    if let Some(error) = &snapshot.error {
        return Err(eyre!("failed to load feed: {error}"));
    }

    let engagement = Engagement::new(api);
    let mut gallery = Gallery::new(Projector::new(
        MediaResolver::from_config(&config.media),
        &config.filters,
    ));
    let liked = engagement.liked_ids();
    gallery.refresh(
        &snapshot.items,
        &CardFilter {
            category: snapshot.filters.category,
            search: &snapshot.filters.search,
            liked_only: false,
            liked: &liked,
        },
    );
    let tiles = gallery.tile_ids();
    let mut masonry = MasonryLayout::new(&config.layout);
    masonry.sync_tiles(&tiles, &mut Headless);
    reveal.sync_tiles(&tiles, &mut Headless);
    let entries = tiles.iter().map(|t| (t.clone(), true)).collect::<Vec<_>>();
    reveal.on_intersections(&entries, &mut Headless);
    if let Err(e) = engagement
        .hydrate(None, tiles.iter().map(String::as_str))
        .await
    {
        log::warn!("engagement unavailable: {e}");
    }

    for card in gallery.cards() {
        let height = card
            .item
            .aspect_ratio_value()
            .map_or(COLUMN_WIDTH, |ratio| COLUMN_WIDTH / ratio);
        masonry.on_content_loaded(card.id(), height);
        let record = engagement.record(card.id());
        println!(
            "{}\t{:?}\tspan={}\tlikes={}\tsaves={}\t{}",
            card.id(),
            card.kind,
            masonry.span(card.id()).unwrap_or_default(),
            record.likes_count,
            record.bookmarks_count,
            gallery.media_url(card.id()).unwrap_or_default(),
        );
    }
    log::info!(
        "{} cards from {} items, more: {}",
        tiles.len(),
        snapshot.items.len(),
        snapshot.has_more
    );
    feed.unsubscribe();
    Ok(())
}
